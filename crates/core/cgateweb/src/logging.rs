use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber.
///
/// Reports all the log events sent either with the `log` crate or the
/// `tracing` crate. The `logging` setting selects between informational
/// and warnings-only output; `--debug` enables everything. `RUST_LOG`
/// overrides both.
pub fn init(logging: bool, debug: bool) {
    let default_level = if debug {
        LevelFilter::TRACE
    } else if logging {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
