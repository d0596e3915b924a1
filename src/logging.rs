use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Resolve the log level from an explicit setting, then `RUST_LOG`, then `info`.
pub fn level_filter(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info)
}

/// Install the process logger.
///
/// Records go to stderr as `[timestamp LEVEL target] message`. Calling this
/// twice is harmless; the second call is ignored.
pub fn init_logging(level: Option<&str>) {
    let filter = level_filter(level);
    let installed = Builder::new()
        .filter_level(filter)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
    if installed.is_ok() {
        log::debug!("logging initialised at {filter}");
    }
}
