/// Where a replacement image lives and which flash area it replaces
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TargetError;

/// Longest host name accepted in an update target.
pub const MAX_HOST_LEN: usize = 64;
/// Longest resource path accepted in an update target.
pub const MAX_PATH_LEN: usize = 128;

pub const DEFAULT_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageKind {
    /// Main program area (the next OTA app slot)
    #[default]
    #[serde(rename = "FIRMWARE")]
    Firmware,
    /// Secondary filesystem area (SPIFFS data partition)
    #[serde(rename = "SPIFFS")]
    FilesystemImage,
}

impl ImageKind {
    /// Map the manifest `type` field. Only `SPIFFS` selects the filesystem
    /// area, anything else writes the program area.
    pub fn from_manifest_type(value: &str) -> Self {
        if value == "SPIFFS" {
            ImageKind::FilesystemImage
        } else {
            ImageKind::Firmware
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Firmware => "FIRMWARE",
            ImageKind::FilesystemImage => "SPIFFS",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    host: heapless::String<MAX_HOST_LEN>,
    path: heapless::String<MAX_PATH_LEN>,
    port: u16,
    kind: ImageKind,
}

impl UpdateTarget {
    pub fn new(host: &str, port: u16, path: &str, kind: ImageKind) -> Result<Self, TargetError> {
        if host.is_empty() {
            return Err(TargetError::EmptyHost);
        }
        if !path.starts_with('/') {
            return Err(TargetError::RelativePath(path.to_string()));
        }

        let host = heapless::String::try_from(host).map_err(|_| TargetError::HostTooLong {
            len: host.len(),
            max: MAX_HOST_LEN,
        })?;
        let path = heapless::String::try_from(path).map_err(|_| TargetError::PathTooLong {
            len: path.len(),
            max: MAX_PATH_LEN,
        })?;

        Ok(Self {
            host,
            path,
            port,
            kind,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }
}

impl fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} image at {}:{}{}", self.kind, self.host, self.port, self.path)
    }
}
