// Host backends: directory-backed flash, recorded restart, configured device id

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ota_core::error::BoxError;
use ota_core::{DeviceIdentity, FlashTarget, ImageKind, Restart};

struct Session {
    kind: ImageKind,
    declared: usize,
    written: usize,
    file: BufWriter<File>,
    part_path: PathBuf,
}

/// Stores images as `firmware.bin` / `spiffs.bin` under a directory.
///
/// Data goes to a `.part` file first and only replaces the stored image when
/// the transaction commits with every announced byte written.
pub struct FileFlashTarget {
    dir: PathBuf,
    capacity: Option<usize>,
    session: Option<Session>,
    finished: bool,
}

impl FileFlashTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity: None,
            session: None,
            finished: false,
        }
    }

    /// Reject images larger than `capacity`, like a fixed-size partition.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image_path(&self, kind: ImageKind) -> PathBuf {
        let name = match kind {
            ImageKind::Firmware => "firmware.bin",
            ImageKind::FilesystemImage => "spiffs.bin",
        };
        self.dir.join(name)
    }

    fn discard(session: Session) {
        drop(session.file);
        if let Err(e) = fs::remove_file(&session.part_path) {
            log::warn!("Could not remove {}: {}", session.part_path.display(), e);
        }
    }
}

impl FlashTarget for FileFlashTarget {
    fn begin(&mut self, size: usize, kind: ImageKind) -> Result<(), BoxError> {
        self.abort();
        self.finished = false;

        if let Some(capacity) = self.capacity {
            if size > capacity {
                return Err(format!(
                    "image of {} bytes does not fit in {} byte area",
                    size, capacity
                )
                .into());
            }
        }

        fs::create_dir_all(&self.dir)?;
        let part_path = self.image_path(kind).with_extension("bin.part");
        let file = BufWriter::new(File::create(&part_path)?);

        self.session = Some(Session {
            kind,
            declared: size,
            written: 0,
            file,
            part_path,
        });
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), BoxError> {
        let session = self.session.as_mut().ok_or("no update in progress")?;
        if session.written + buf.len() > session.declared {
            return Err("write past the announced image size".into());
        }
        session.file.write_all(buf)?;
        session.written += buf.len();
        Ok(())
    }

    fn end(&mut self) -> Result<(), BoxError> {
        let mut session = self.session.take().ok_or("no update in progress")?;
        if session.written != session.declared {
            log::warn!(
                "Commit with {} of {} bytes, image discarded",
                session.written,
                session.declared
            );
            Self::discard(session);
            return Ok(());
        }

        session.file.flush()?;
        session.file.get_ref().sync_all()?;
        let image_path = self.image_path(session.kind);
        fs::rename(&session.part_path, &image_path)?;
        log::info!("Stored {} bytes in {}", session.written, image_path.display());

        self.finished = true;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            Self::discard(session);
        }
    }
}

/// Records restart requests instead of rebooting the host.
#[derive(Debug, Default)]
pub struct HostRestart {
    requests: u32,
}

impl HostRestart {
    pub fn requested(&self) -> bool {
        self.requests > 0
    }
}

impl Restart for HostRestart {
    fn restart(&mut self) {
        log::info!("Restart requested");
        self.requests += 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HostIdentity {
    id: u64,
}

impl HostIdentity {
    pub fn from_mac(mac: [u8; 6]) -> Self {
        Self {
            id: super::mac_to_id(mac),
        }
    }

    /// Id derived from the host name.
    pub fn from_hostname() -> Self {
        let name = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| fs::read_to_string("/etc/hostname").ok())
            .unwrap_or_default();
        Self::from_name(name.trim())
    }

    /// First six bytes of SHA-256(name), read like a MAC. Same name, same id.
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&digest[..6]);
        Self::from_mac(mac)
    }
}

impl DeviceIdentity for HostIdentity {
    fn device_id(&self) -> u64 {
        self.id
    }
}
