//! Bearing-range measurement from a planar pose to a point landmark.

use crate::core::factor::{Factor, FactorIds, FactorValues};
use crate::core::store::TypedId;
use crate::linalg::gaussian::JacobianFactor;
use crate::manifold::{SE2, wrap_angle};
use nalgebra::{DMatrix, DVector, Matrix2, Matrix2x3, RowVector2, Vector2};

/// Bearing and range of a 2D landmark observed from an SE(2) pose.
///
/// With `p = Rᵀ (l - t)` the landmark in the pose frame:
///
/// ```text
/// e = [ w_b · wrap(atan2(p_y, p_x) - bearing),
///       w_r · (‖p‖ - range) ]
/// ```
///
/// The landmark must not coincide with the pose position, where the bearing is
/// undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct BearingRangeFactor2 {
    edges: (TypedId<SE2>, TypedId<Vector2<f64>>),
    /// Measured bearing in the pose frame, radians
    pub bearing: f64,
    /// Measured range
    pub range: f64,
    /// Weights for the bearing and range components
    pub weights: Vector2<f64>,
}

impl BearingRangeFactor2 {
    pub fn new(
        pose: TypedId<SE2>,
        landmark: TypedId<Vector2<f64>>,
        bearing: f64,
        range: f64,
    ) -> Self {
        BearingRangeFactor2 {
            edges: (pose, landmark),
            bearing,
            range,
            weights: Vector2::new(1.0, 1.0),
        }
    }

    /// # Panics
    /// If either weight is not finite.
    pub fn with_weights(mut self, bearing_weight: f64, range_weight: f64) -> Self {
        assert!(
            bearing_weight.is_finite() && range_weight.is_finite(),
            "bearing-range weights must be finite"
        );
        self.weights = Vector2::new(bearing_weight, range_weight);
        self
    }

    fn landmark_in_pose_frame(pose: &SE2, landmark: &Vector2<f64>) -> Vector2<f64> {
        pose.rotation_matrix().transpose() * (landmark - pose.translation())
    }
}

impl Factor for BearingRangeFactor2 {
    type Variables = (SE2, Vector2<f64>);
    type ErrorVector = Vector2<f64>;

    fn edges(&self) -> &FactorIds<Self> {
        &self.edges
    }

    fn error_vector(&self, values: &FactorValues<Self>) -> Vector2<f64> {
        let p = Self::landmark_in_pose_frame(&values.0, &values.1);
        let bearing_error = wrap_angle(p.y.atan2(p.x) - self.bearing);
        let range_error = p.norm() - self.range;
        self.weights.component_mul(&Vector2::new(bearing_error, range_error))
    }

    fn linearize(&self, values: &FactorValues<Self>) -> JacobianFactor {
        let (pose, landmark) = values;
        let p = Self::landmark_in_pose_frame(pose, landmark);
        let range_squared = p.norm_squared();
        let range = range_squared.sqrt();

        // Derivatives of [bearing, range] with respect to p.
        let mut j_measurement_wrt_p = Matrix2::zeros();
        j_measurement_wrt_p.set_row(0, &(RowVector2::new(-p.y, p.x) / range_squared));
        j_measurement_wrt_p.set_row(1, &(RowVector2::new(p.x, p.y) / range));

        // p under the right perturbation [δθ, δt] of the pose: p - δt - δθ·[-p_y, p_x].
        let j_p_wrt_pose = Matrix2x3::new(p.y, -1.0, 0.0, -p.x, 0.0, -1.0);
        let j_p_wrt_landmark = pose.rotation_matrix().transpose();

        let weights = Matrix2::from_diagonal(&self.weights);
        let jacobian_wrt_pose = weights * j_measurement_wrt_p * j_p_wrt_pose;
        let jacobian_wrt_landmark = weights * j_measurement_wrt_p * j_p_wrt_landmark;

        let residual = self.error_vector(values);
        JacobianFactor::new(
            vec![self.edges.0.erased(), self.edges.1.erased()],
            vec![
                DMatrix::from_column_slice(2, 3, jacobian_wrt_pose.as_slice()),
                DMatrix::from_column_slice(2, 2, jacobian_wrt_landmark.as_slice()),
            ],
            DVector::from_column_slice(residual.as_slice()),
        )
    }
}
