// Centralized version information

// Integer compared against the manifest `version`, set by build.rs
pub const FIRMWARE_VERSION_STR: &str = env!("FIRMWARE_VERSION");

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn firmware_version() -> u32 {
    FIRMWARE_VERSION_STR.parse().unwrap_or(0)
}

// Version info string for logging
pub fn version_info() -> String {
    format!("build {} (cargo {})", firmware_version(), CARGO_VERSION)
}
