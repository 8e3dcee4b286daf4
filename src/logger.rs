//! Logging setup for applications built on tangent-fusion.
//!
//! The library itself only emits `tracing` events; call [`init_logger`] once in
//! a binary or test harness to print them.

use tracing::Level;

/// Initialize the tracing subscriber with the default INFO level.
///
/// Format: `[LEVEL YYYY-MM-DD HH:MM:SS module]` for INFO/WARN/ERROR
///         `[LEVEL YYYY-MM-DD HH:MM:SS file:line]` for DEBUG/TRACE
///
/// # Example
/// ```no_run
/// tangent_fusion::init_logger();
/// tracing::info!("pose graph loaded");
/// ```
///
/// # Environment Variables
/// `RUST_LOG` overrides the default level:
/// ```bash
/// RUST_LOG=tangent_fusion=debug cargo test
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level.
///
/// Does nothing if a global subscriber is already installed.
///
/// # Example
/// ```no_run
/// use tracing::Level;
///
/// tangent_fusion::init_logger_with_level(Level::DEBUG);
/// tracing::debug!("per-trial tables enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(CustomFormatter)
        .try_init();
}

/// Bracketed event formatter
struct CustomFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use chrono::Local;

        let metadata = event.metadata();
        let level = *metadata.level();

        write!(writer, "[{} ", colored_level(level))?;
        write!(writer, "{} ", Local::now().format("%Y-%m-%d %H:%M:%S"))?;

        match (level, metadata.file()) {
            (Level::DEBUG | Level::TRACE, Some(file)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{filename}")?;
                if let Some(line) = metadata.line() {
                    write!(writer, ":{line}")?;
                }
            }
            _ => write!(writer, "{}", metadata.target())?,
        }

        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn colored_level(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colored_level_names() {
        assert!(colored_level(Level::WARN).contains("WARN"));
        assert!(colored_level(Level::DEBUG).contains("DEBUG"));
    }

    #[test]
    fn test_init_logger_twice_is_harmless() {
        init_logger_with_level(Level::WARN);
        init_logger();
        tracing::warn!("logger initialized");
    }
}
