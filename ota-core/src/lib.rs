//! OTA Core - hardware-independent update engine for ESP32 HTTP/JSON OTA
//!
//! This crate holds the logic that decides whether a newer image is published,
//! parses the raw HTTP response of the image download and streams the body into
//! a flash target. Everything that touches hardware (flash, restart, device id,
//! the manifest HTTP client) is injected through the traits in [`platform`] and
//! [`flash`], so the whole pipeline can be tested on the host.

pub mod config;
pub mod error;
pub mod flash;
pub mod headers;
pub mod http;
pub mod manifest;
pub mod net;
pub mod platform;
pub mod target;
pub mod updater;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::OtaConfig;
pub use error::{CheckFailure, TargetError, UpdateError};
pub use flash::{FlashTarget, FlashWriter, TxState};
pub use headers::{parse_headers, ResponseHeaders};
pub use http::PlainHttpClient;
pub use manifest::{decide, Decision, Manifest, ManifestClient, UpdateCheck};
pub use net::{Connection, Connector, TcpConnector};
pub use platform::{DeviceIdentity, HttpGet, HttpResponse, Restart};
pub use target::{ImageKind, UpdateTarget};
pub use updater::Updater;
