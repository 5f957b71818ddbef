//! Update orchestrator.
//!
//! Flow of one attempt:
//! 1. (optional) manifest check
//! 2. connect to the image host
//! 3. hand-framed GET, wait for the first response byte
//! 4. parse the header block
//! 5. stream the body into flash and commit
//! 6. restart
//!
//! The connection is released on every exit path. A successful attempt ends
//! in a restart, so on hardware `run_update` only ever returns errors.

use std::io::{self, BufRead, BufReader};

use crate::config::OtaConfig;
use crate::error::UpdateError;
use crate::flash::{FlashTarget, FlashWriter};
use crate::headers::parse_headers;
use crate::http::write_get_request;
use crate::manifest::{ManifestClient, UpdateCheck};
use crate::net::{Connection, Connector};
use crate::platform::{DeviceIdentity, HttpGet, Restart};
use crate::target::{ImageKind, UpdateTarget};

pub struct Updater<C, F, R> {
    config: OtaConfig,
    connector: C,
    flash: F,
    restart: R,
}

impl<C, F, R> Updater<C, F, R>
where
    C: Connector,
    F: FlashTarget,
    R: Restart,
{
    pub fn new(config: OtaConfig, connector: C, flash: F, restart: R) -> Self {
        Self {
            config,
            connector,
            flash,
            restart,
        }
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    /// Version compared against published manifests from now on.
    pub fn set_current_version(&mut self, version: u32) {
        self.config.current_version = version;
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn restarter(&self) -> &R {
        &self.restart
    }

    pub fn check_for_update<H, I>(&self, http: &mut H, identity: &I) -> UpdateCheck
    where
        H: HttpGet + ?Sized,
        I: DeviceIdentity + ?Sized,
    {
        ManifestClient::new(&self.config).check(http, identity)
    }

    /// Check the manifest and run the update when a newer image is published.
    ///
    /// `Ok(None)` means nothing was downloaded (up to date, other application
    /// or the check itself failed; the reason is logged).
    pub fn check_and_update<H, I>(
        &mut self,
        http: &mut H,
        identity: &I,
    ) -> Result<Option<usize>, UpdateError>
    where
        H: HttpGet + ?Sized,
        I: DeviceIdentity + ?Sized,
    {
        match self.check_for_update(http, identity) {
            UpdateCheck::Available(target) => self.run_update(&target).map(Some),
            _ => Ok(None),
        }
    }

    /// Update from an explicit location, regardless of versions.
    pub fn force_update(
        &mut self,
        host: &str,
        port: u16,
        path: &str,
        kind: ImageKind,
    ) -> Result<usize, UpdateError> {
        let target = UpdateTarget::new(host, port, path, kind)?;
        log::info!("Forced update from {}", target);
        self.run_update(&target)
    }

    /// Download `target` and write it to flash.
    pub fn run_update(&mut self, target: &UpdateTarget) -> Result<usize, UpdateError> {
        log::info!("Connecting to: {} port {}", target.host(), target.port());

        let mut conn = match self.connector.connect(target.host(), target.port()) {
            Ok(conn) => conn,
            Err(source) => {
                log::error!(
                    "Connection to {} failed. Please check your setup: {}",
                    target.host(),
                    source
                );
                return Err(UpdateError::ConnectionFailure {
                    host: target.host().to_string(),
                    port: target.port(),
                    source,
                });
            }
        };

        let result = self.download(&mut conn, target);
        conn.close();

        if let Err(e) = &result {
            log::error!("OTA update aborted: {}", e);
        }
        result
    }

    fn download(
        &mut self,
        conn: &mut C::Connection,
        target: &UpdateTarget,
    ) -> Result<usize, UpdateError> {
        let connection_failure = |source: io::Error| UpdateError::ConnectionFailure {
            host: target.host().to_string(),
            port: target.port(),
            source,
        };

        log::info!("Fetching bin: {}", target.path());
        write_get_request(conn, target.host(), target.port(), target.path())
            .map_err(connection_failure)?;

        let timeout = self.config.first_byte_timeout();
        let timeout_ms = timeout.as_millis() as u64;
        conn.set_read_timeout(Some(timeout)).map_err(connection_failure)?;

        let mut reader = BufReader::new(conn);
        match reader.fill_buf().map(|buf| buf.is_empty()) {
            Ok(false) => {}
            Ok(true) => {
                return Err(UpdateError::MalformedResponse(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed without a response",
                )));
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                log::info!("Client timeout after {} ms", timeout_ms);
                return Err(UpdateError::Timeout(timeout_ms));
            }
            Err(e) => return Err(connection_failure(e)),
        }
        // Only the first byte is guarded
        reader
            .get_mut()
            .set_read_timeout(None)
            .map_err(connection_failure)?;

        let headers = parse_headers(&mut reader).map_err(UpdateError::MalformedResponse)?;
        log::debug!(
            "status: {:?}, content length: {}, octet-stream: {}",
            headers.status,
            headers.content_length,
            headers.content_type_valid
        );

        if !headers.status_ok() {
            log::info!("Got a non 200 status code from server. Exiting OTA update");
            return Err(UpdateError::NonOkStatus(headers.status));
        }
        if !headers.has_usable_content() {
            log::error!("There was no content in the response");
            return Err(UpdateError::NoUsableContent {
                content_length: headers.content_length,
                content_type_valid: headers.content_type_valid,
            });
        }

        let mut writer = FlashWriter::new(&mut self.flash, self.config.copy_buffer_size);
        writer.write_image(
            headers.content_length,
            target.kind(),
            &mut reader,
            &mut self.restart,
        )
    }
}
