//! Manifest check: fetch the published descriptor and decide whether to update.
//!
//! The manifest is a small JSON document:
//!
//! ```json
//! {"name": "sensor", "version": 4, "type": "FIRMWARE",
//!  "host": "update.example.com", "bin": "/sensor/v4.bin", "port": 80}
//! ```
//!
//! An update is available iff `name` equals the configured application name
//! and `version` is strictly greater than the running version. The check has no
//! side effects besides the one GET and never retries.

use serde::Deserialize;
use url::Url;

use crate::config::OtaConfig;
use crate::error::{CheckFailure, TargetError};
use crate::platform::{DeviceIdentity, HttpGet};
use crate::target::{ImageKind, UpdateTarget, DEFAULT_PORT};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub host: String,
    pub bin: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Manifest {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn image_kind(&self) -> ImageKind {
        ImageKind::from_manifest_type(&self.kind)
    }

    pub fn target(&self) -> Result<UpdateTarget, TargetError> {
        UpdateTarget::new(&self.host, self.port, &self.bin, self.image_kind())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Update,
    UpToDate,
    OtherApplication,
}

/// Compare a manifest against the running application.
pub fn decide(manifest: &Manifest, app_name: &str, current_version: u32) -> Decision {
    if manifest.name != app_name {
        Decision::OtherApplication
    } else if manifest.version > current_version {
        Decision::Update
    } else {
        Decision::UpToDate
    }
}

/// Outcome of one manifest check.
#[derive(Debug)]
pub enum UpdateCheck {
    Available(UpdateTarget),
    UpToDate { published: u32, current: u32 },
    /// The manifest describes a different application
    OtherApplication { name: String },
    Failed(CheckFailure),
}

impl UpdateCheck {
    pub fn update_available(&self) -> bool {
        matches!(self, UpdateCheck::Available(_))
    }

    pub fn target(&self) -> Option<&UpdateTarget> {
        match self {
            UpdateCheck::Available(target) => Some(target),
            _ => None,
        }
    }

    pub fn into_target(self) -> Option<UpdateTarget> {
        match self {
            UpdateCheck::Available(target) => Some(target),
            _ => None,
        }
    }
}

/// Builds the manifest request and applies the decision rule.
pub struct ManifestClient<'a> {
    config: &'a OtaConfig,
}

impl<'a> ManifestClient<'a> {
    pub fn new(config: &'a OtaConfig) -> Self {
        Self { config }
    }

    /// Manifest URL, with `id=<device id>` appended when enabled.
    pub fn request_url<I>(&self, identity: &I) -> Result<Url, CheckFailure>
    where
        I: DeviceIdentity + ?Sized,
    {
        let mut url =
            Url::parse(&self.config.manifest_url).map_err(|e| CheckFailure::InvalidUrl {
                url: self.config.manifest_url.clone(),
                reason: e.to_string(),
            })?;

        if self.config.include_device_id {
            url.query_pairs_mut()
                .append_pair("id", &identity.device_id().to_string());
        }
        Ok(url)
    }

    pub fn check<H, I>(&self, http: &mut H, identity: &I) -> UpdateCheck
    where
        H: HttpGet + ?Sized,
        I: DeviceIdentity + ?Sized,
    {
        match self.fetch(http, identity) {
            Ok(manifest) => self.evaluate(manifest),
            Err(failure) => {
                log::error!("Manifest check failed: {}", failure);
                UpdateCheck::Failed(failure)
            }
        }
    }

    fn fetch<H, I>(&self, http: &mut H, identity: &I) -> Result<Manifest, CheckFailure>
    where
        H: HttpGet + ?Sized,
        I: DeviceIdentity + ?Sized,
    {
        let url = self.request_url(identity)?;
        log::debug!("Getting manifest: {}", url);

        let response = http.get(url.as_str()).map_err(CheckFailure::Network)?;
        if response.status != 200 {
            return Err(CheckFailure::Status(response.status));
        }

        Manifest::from_slice(&response.body).map_err(CheckFailure::Malformed)
    }

    fn evaluate(&self, manifest: Manifest) -> UpdateCheck {
        log::debug!(
            "Manifest: name={} version={} type={} host={} port={} bin={}",
            manifest.name,
            manifest.version,
            manifest.kind,
            manifest.host,
            manifest.port,
            manifest.bin
        );

        match decide(&manifest, &self.config.app_name, self.config.current_version) {
            Decision::OtherApplication => {
                log::info!(
                    "Manifest is for {:?}, not {:?}",
                    manifest.name,
                    self.config.app_name
                );
                UpdateCheck::OtherApplication {
                    name: manifest.name,
                }
            }
            Decision::UpToDate => {
                log::info!(
                    "Already up to date (running {}, published {})",
                    self.config.current_version,
                    manifest.version
                );
                UpdateCheck::UpToDate {
                    published: manifest.version,
                    current: self.config.current_version,
                }
            }
            Decision::Update => match manifest.target() {
                Ok(target) => {
                    log::info!(
                        "Version {} available (running {}): {}",
                        manifest.version,
                        self.config.current_version,
                        target
                    );
                    UpdateCheck::Available(target)
                }
                Err(e) => {
                    log::error!("Manifest target rejected: {}", e);
                    UpdateCheck::Failed(CheckFailure::InvalidTarget(e))
                }
            },
        }
    }
}
