//! Streaming flash writer: begin, copy, finalize against an injected target.
//!
//! Once bytes have been accepted the previous contents of the area are gone,
//! so there is no rollback. A short copy leaves the transaction aborted and the
//! target is never asked to commit it.

use std::io::{self, Read};

use crate::error::{BoxError, UpdateError};
use crate::platform::Restart;
use crate::target::ImageKind;

/// Flash area that accepts one image per transaction.
pub trait FlashTarget {
    /// Reserve `size` bytes in the area selected by `kind`.
    fn begin(&mut self, size: usize, kind: ImageKind) -> Result<(), BoxError>;

    fn write(&mut self, buf: &[u8]) -> Result<(), BoxError>;

    /// Commit the transaction.
    fn end(&mut self) -> Result<(), BoxError>;

    /// The committed image is complete and will be used after restart.
    fn is_finished(&self) -> bool;

    /// Release an uncommitted transaction. Nothing is restored.
    fn abort(&mut self) {}
}

impl<T: FlashTarget + ?Sized> FlashTarget for &mut T {
    fn begin(&mut self, size: usize, kind: ImageKind) -> Result<(), BoxError> {
        (**self).begin(size, kind)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), BoxError> {
        (**self).write(buf)
    }

    fn end(&mut self) -> Result<(), BoxError> {
        (**self).end()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NotStarted,
    Writing { written: usize, declared: usize },
    Committed,
    Aborted,
}

pub struct FlashWriter<F> {
    target: F,
    state: TxState,
    buffer_size: usize,
}

impl<F: FlashTarget> FlashWriter<F> {
    pub fn new(target: F, buffer_size: usize) -> Self {
        Self {
            target,
            state: TxState::NotStarted,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn into_inner(self) -> F {
        self.target
    }

    /// Stream `declared` bytes from `source` into the target and commit.
    ///
    /// On a verified commit `restart` is invoked; on hardware that call does
    /// not return. The returned count is only observable with a restart that
    /// returns (tests, host runs).
    pub fn write_image<R, S>(
        &mut self,
        declared: usize,
        kind: ImageKind,
        source: &mut R,
        restart: &mut S,
    ) -> Result<usize, UpdateError>
    where
        R: Read + ?Sized,
        S: Restart + ?Sized,
    {
        if self.state != TxState::NotStarted {
            return Err(UpdateError::InvalidState(self.state));
        }
        if declared == 0 {
            return Err(UpdateError::NoUsableContent {
                content_length: 0,
                content_type_valid: true,
            });
        }

        log::info!("OTA type: {}", kind);
        if let Err(e) = self.target.begin(declared, kind) {
            log::error!("Not enough space to begin OTA: {}", e);
            self.state = TxState::Aborted;
            return Err(UpdateError::InsufficientStorage(e));
        }

        log::info!("Begin OTA of {} bytes. This may take a few minutes", declared);
        self.state = TxState::Writing {
            written: 0,
            declared,
        };

        let written = self.copy_from(declared, source);

        if written != declared {
            log::error!("Written only {}/{} bytes", written, declared);
            self.target.abort();
            self.state = TxState::Aborted;
            return Err(UpdateError::ShortWrite { written, declared });
        }
        log::info!("Written {} bytes successfully", written);

        if let Err(e) = self.target.end() {
            log::error!("Error occurred while finalizing: {}", e);
            self.state = TxState::Aborted;
            return Err(UpdateError::FinalizeFailure(e));
        }
        log::info!("OTA done");

        if !self.target.is_finished() {
            log::error!("Update not finished? Something went wrong");
            self.state = TxState::Aborted;
            return Err(UpdateError::IncompleteAfterFinalize);
        }

        self.state = TxState::Committed;
        log::info!("Update successfully completed. Rebooting");
        restart.restart();

        Ok(written)
    }

    /// Single pass copy; stops at `declared` bytes, end of stream, a read
    /// error or a rejected write, whichever comes first.
    fn copy_from<R: Read + ?Sized>(&mut self, declared: usize, source: &mut R) -> usize {
        let mut buf = vec![0u8; self.buffer_size];
        let mut written = 0;
        let mut last_pct = 0;

        while written < declared {
            let want = (declared - written).min(buf.len());
            let n = match source.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Source failed after {} bytes: {}", written, e);
                    break;
                }
            };

            if let Err(e) = self.target.write(&buf[..n]) {
                log::error!("Flash write failed after {} bytes: {}", written, e);
                break;
            }
            written += n;
            self.state = TxState::Writing { written, declared };

            // Log progress at each 10% increment
            let pct = written * 100 / declared;
            if pct / 10 > last_pct / 10 {
                log::info!("OTA: {}/{} bytes ({}%)", written, declared, pct);
                last_pct = pct;
            }
        }

        written
    }
}
