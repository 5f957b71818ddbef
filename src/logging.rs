use log::{Level, LevelFilter, Metadata, Record};
use std::sync::OnceLock;
use std::time::SystemTime;

static BOOT_TIME: OnceLock<SystemTime> = OnceLock::new();

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Logger that prints colored lines with time since boot and the module name
struct UpdateLogger;

impl log::Log for UpdateLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let boot_time = BOOT_TIME.get_or_init(SystemTime::now);
        let elapsed = SystemTime::now()
            .duration_since(*boot_time)
            .unwrap_or_default();

        let (color, level_char) = match record.level() {
            Level::Error => (colors::BRIGHT_RED, 'E'),
            Level::Warn => (colors::BRIGHT_YELLOW, 'W'),
            Level::Info => (colors::BRIGHT_GREEN, 'I'),
            Level::Debug => (colors::BRIGHT_BLUE, 'D'),
            Level::Trace => (colors::GRAY, 'T'),
        };

        println!(
            "{}{} [{}] {:>12} | {}{}",
            color,
            format_elapsed(elapsed.as_secs(), elapsed.subsec_millis()),
            level_char,
            short_module(record.module_path()),
            record.args(),
            colors::RESET
        );
    }

    fn flush(&self) {}
}

static LOGGER: UpdateLogger = UpdateLogger;

/// Install the logger; `level` is a name like `info` or `debug`.
pub fn init_logger(level: &str) -> Result<(), log::SetLoggerError> {
    let _ = BOOT_TIME.set(SystemTime::now());
    log::set_logger(&LOGGER)?;
    log::set_max_level(parse_level(level).unwrap_or(LevelFilter::Info));
    Ok(())
}

/// Change the level after configuration is loaded. Unknown names are ignored.
pub fn set_level(level: &str) {
    match parse_level(level) {
        Some(lf) => log::set_max_level(lf),
        None => log::warn!("Unknown log level '{}', keeping {}", level, log::max_level()),
    }
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    let lf = match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    };
    Some(lf)
}

fn format_elapsed(seconds: u64, millis: u32) -> String {
    if seconds < 60 {
        format!("{:>3}.{:03}s", seconds, millis)
    } else if seconds < 3600 {
        format!("{:>2}m{:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{:>2}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

fn short_module(path: Option<&str>) -> &str {
    let module = path
        .and_then(|p| p.split("::").last())
        .unwrap_or("unknown");
    module.get(..12).unwrap_or(module)
}
