// Capabilities the engine calls into but does not implement

use crate::error::BoxError;

/// Unconditional device reset, invoked only after a verified commit.
///
/// On hardware this never returns.
pub trait Restart {
    fn restart(&mut self);
}

/// Stable numeric device identifier (e.g. the factory MAC).
pub trait DeviceIdentity {
    fn device_id(&self) -> u64;
}

/// Response of a manifest GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Single-shot HTTP(S) GET used for the manifest.
pub trait HttpGet {
    fn get(&mut self, url: &str) -> Result<HttpResponse, BoxError>;
}

impl<T: Restart + ?Sized> Restart for &mut T {
    fn restart(&mut self) {
        (**self).restart()
    }
}

impl<T: DeviceIdentity + ?Sized> DeviceIdentity for &T {
    fn device_id(&self) -> u64 {
        (**self).device_id()
    }
}

impl<T: HttpGet + ?Sized> HttpGet for &mut T {
    fn get(&mut self, url: &str) -> Result<HttpResponse, BoxError> {
        (**self).get(url)
    }
}
