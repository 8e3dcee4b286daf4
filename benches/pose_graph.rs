//! Linearization and Levenberg-Marquardt on a noisy SE(2) odometry chain.
//!
//! ```bash
//! cargo bench --bench pose_graph
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tangent_fusion::manifold::{LieGroup, Manifold, SE2};
use tangent_fusion::{
    BetweenFactor, FactorGraph, LevenbergMarquardt, PriorFactor, VariableAssignments,
};

/// Chain of `poses` SE(2) poses with odometry and a loop closure every ten poses.
fn build_chain(poses: usize) -> (FactorGraph, VariableAssignments) {
    let mut rng = StdRng::seed_from_u64(0);
    let odometry = SE2::from_xy_angle(1.0, 0.0, 0.1);

    let mut values = VariableAssignments::new();
    let mut truth = vec![SE2::identity()];
    let mut ids = vec![values.store(SE2::identity())];
    for _ in 1..poses {
        let next = truth[truth.len() - 1].compose(&odometry, None, None);
        let noise = Vector3::new(
            rng.random_range(-0.05..0.05),
            rng.random_range(-0.1..0.1),
            rng.random_range(-0.1..0.1),
        );
        ids.push(values.store(next.retract(&noise)));
        truth.push(next);
    }

    let mut graph = FactorGraph::new();
    graph.add(PriorFactor::new(ids[0], SE2::identity()));
    for pair in ids.windows(2) {
        graph.add(BetweenFactor::new(pair[0], pair[1], odometry));
    }
    for i in (10..poses).step_by(10) {
        let measured = truth[i - 10].between(&truth[i], None, None);
        graph.add(BetweenFactor::new(ids[i - 10], ids[i], measured));
    }
    (graph, values)
}

fn bench_linearization(c: &mut Criterion) {
    let mut group = c.benchmark_group("linearize");
    for poses in [100, 1000] {
        let (graph, values) = build_chain(poses);
        group.bench_with_input(BenchmarkId::from_parameter(poses), &poses, |b, _| {
            b.iter(|| black_box(graph.linearized(black_box(&values))))
        });
    }
    group.finish();
}

fn bench_levenberg_marquardt(c: &mut Criterion) {
    let mut group = c.benchmark_group("levenberg_marquardt");
    group.sample_size(10);
    for poses in [50, 200] {
        let (graph, initial) = build_chain(poses);
        group.bench_with_input(BenchmarkId::from_parameter(poses), &poses, |b, _| {
            b.iter(|| {
                let mut values = initial.clone();
                let mut solver = LevenbergMarquardt::new();
                black_box(solver.optimize(&graph, &mut values).ok())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_linearization, bench_levenberg_marquardt);
criterion_main!(benches);
