/// Update engine configuration, built once per updater
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::target::ImageKind;

pub const DEFAULT_FIRST_BYTE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 4096;
/// Sockets reject a zero read timeout
pub const MIN_FIRST_BYTE_TIMEOUT_MS: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtaConfig {
    /// Application name a manifest must carry to be considered
    pub app_name: String,
    /// Kind used for forced updates when the caller does not name one
    #[serde(default)]
    pub image_kind: ImageKind,
    pub current_version: u32,
    pub manifest_url: String,
    /// Append `?id=<device id>` to the manifest request
    #[serde(default)]
    pub include_device_id: bool,
    #[serde(
        default = "default_first_byte_timeout_ms",
        deserialize_with = "deserialize_first_byte_timeout_ms"
    )]
    pub first_byte_timeout_ms: u64,
    #[serde(
        default = "default_copy_buffer_size",
        deserialize_with = "deserialize_copy_buffer_size"
    )]
    pub copy_buffer_size: usize,
}

fn default_first_byte_timeout_ms() -> u64 {
    DEFAULT_FIRST_BYTE_TIMEOUT_MS
}

fn default_copy_buffer_size() -> usize {
    DEFAULT_COPY_BUFFER_SIZE
}

fn deserialize_first_byte_timeout_ms<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(u64::deserialize(d)?.max(MIN_FIRST_BYTE_TIMEOUT_MS))
}

fn deserialize_copy_buffer_size<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    Ok(usize::deserialize(d)?.max(1))
}

impl OtaConfig {
    pub fn new(
        app_name: impl Into<String>,
        image_kind: ImageKind,
        current_version: u32,
        manifest_url: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            image_kind,
            current_version,
            manifest_url: manifest_url.into(),
            include_device_id: false,
            first_byte_timeout_ms: DEFAULT_FIRST_BYTE_TIMEOUT_MS,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    pub fn with_device_id(mut self, include: bool) -> Self {
        self.include_device_id = include;
        self
    }

    pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.first_byte_timeout_ms = ms.max(MIN_FIRST_BYTE_TIMEOUT_MS);
        self
    }

    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size.max(1);
        self
    }

    /// Never zero, even when the field was set directly.
    pub fn first_byte_timeout(&self) -> Duration {
        Duration::from_millis(self.first_byte_timeout_ms.max(MIN_FIRST_BYTE_TIMEOUT_MS))
    }
}
