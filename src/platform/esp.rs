// ESP-IDF backends: OTA/SPIFFS partitions, eFuse MAC, restart, manifest client, WiFi

use anyhow::{bail, Result};
use core::ffi::c_void;
use core::ptr;
use std::time::Duration;

use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::Read as _;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    http::client::{Configuration as HttpConfiguration, EspHttpConnection},
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
use esp_idf_sys::{
    esp, esp_efuse_mac_get_default, esp_ota_abort, esp_ota_begin, esp_ota_end,
    esp_ota_get_next_update_partition, esp_ota_handle_t, esp_ota_mark_app_valid_cancel_rollback,
    esp_ota_set_boot_partition, esp_ota_write, esp_partition_erase_range,
    esp_partition_find_first, esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_DATA_SPIFFS,
    esp_partition_t, esp_partition_type_t_ESP_PARTITION_TYPE_DATA, esp_partition_write,
    esp_restart, EspError,
};
use ota_core::error::BoxError;
use ota_core::{DeviceIdentity, FlashTarget, HttpGet, HttpResponse, ImageKind, Restart};

const FLASH_SECTOR_SIZE: usize = 4096;
const MAX_MANIFEST_LEN: usize = 4096;
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);

enum Session {
    Idle,
    App {
        handle: esp_ota_handle_t,
        partition: *const esp_partition_t,
    },
    Data {
        partition: *const esp_partition_t,
        declared: usize,
        written: usize,
    },
}

/// Writes application images to the next OTA slot and filesystem images to
/// the SPIFFS data partition.
pub struct EspFlashTarget {
    session: Session,
    finished: bool,
}

impl EspFlashTarget {
    pub fn new() -> Self {
        Self {
            session: Session::Idle,
            finished: false,
        }
    }

    fn begin_app(&mut self, size: usize) -> Result<(), BoxError> {
        let partition = unsafe { esp_ota_get_next_update_partition(ptr::null()) };
        if partition.is_null() {
            return Err("no OTA update partition".into());
        }
        check_fits(partition, size)?;

        let mut handle: esp_ota_handle_t = Default::default();
        esp!(unsafe { esp_ota_begin(partition, size as _, &mut handle as *mut _) })?;

        self.session = Session::App { handle, partition };
        Ok(())
    }

    fn begin_data(&mut self, size: usize) -> Result<(), BoxError> {
        let partition = unsafe {
            esp_partition_find_first(
                esp_partition_type_t_ESP_PARTITION_TYPE_DATA,
                esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_DATA_SPIFFS,
                ptr::null(),
            )
        };
        if partition.is_null() {
            return Err("no SPIFFS partition".into());
        }
        let capacity = check_fits(partition, size)?;

        // Erase whole sectors only
        let erase_len = size.div_ceil(FLASH_SECTOR_SIZE) * FLASH_SECTOR_SIZE;
        esp!(unsafe { esp_partition_erase_range(partition, 0, erase_len.min(capacity) as _) })?;

        self.session = Session::Data {
            partition,
            declared: size,
            written: 0,
        };
        Ok(())
    }
}

impl Default for EspFlashTarget {
    fn default() -> Self {
        Self::new()
    }
}

fn check_fits(partition: *const esp_partition_t, size: usize) -> Result<usize, BoxError> {
    let capacity = unsafe { (*partition).size } as usize;
    if size > capacity {
        return Err(format!(
            "image of {} bytes does not fit in {} byte partition",
            size, capacity
        )
        .into());
    }
    Ok(capacity)
}

impl FlashTarget for EspFlashTarget {
    fn begin(&mut self, size: usize, kind: ImageKind) -> Result<(), BoxError> {
        self.abort();
        self.finished = false;
        match kind {
            ImageKind::Firmware => self.begin_app(size),
            ImageKind::FilesystemImage => self.begin_data(size),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), BoxError> {
        match &mut self.session {
            Session::Idle => Err("no update in progress".into()),
            Session::App { handle, .. } => {
                esp!(unsafe {
                    esp_ota_write(*handle, buf.as_ptr() as *const c_void, buf.len() as _)
                })?;
                Ok(())
            }
            Session::Data {
                partition,
                declared,
                written,
            } => {
                if *written + buf.len() > *declared {
                    return Err("write past the announced image size".into());
                }
                esp!(unsafe {
                    esp_partition_write(
                        *partition,
                        *written as _,
                        buf.as_ptr() as *const c_void,
                        buf.len() as _,
                    )
                })?;
                *written += buf.len();
                Ok(())
            }
        }
    }

    fn end(&mut self) -> Result<(), BoxError> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => Err("no update in progress".into()),
            Session::App { handle, partition } => {
                // esp_ota_end validates the image and releases the handle
                esp!(unsafe { esp_ota_end(handle) })?;
                esp!(unsafe { esp_ota_set_boot_partition(partition) })?;
                self.finished = true;
                Ok(())
            }
            Session::Data {
                declared, written, ..
            } => {
                self.finished = written == declared;
                Ok(())
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn abort(&mut self) {
        if let Session::App { handle, .. } = std::mem::replace(&mut self.session, Session::Idle) {
            if let Err(e) = esp!(unsafe { esp_ota_abort(handle) }) {
                log::warn!("esp_ota_abort failed: {:?}", e);
            }
        }
    }
}

impl Drop for EspFlashTarget {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Confirm the running image so the bootloader does not roll it back.
pub fn mark_running_app_valid() {
    if let Err(e) = esp!(unsafe { esp_ota_mark_app_valid_cancel_rollback() }) {
        log::warn!("Could not mark running app valid: {:?}", e);
    }
}

pub struct EspRestart;

impl Restart for EspRestart {
    fn restart(&mut self) {
        log::info!("Rebooting...");
        // Give the log a chance to drain
        FreeRtos::delay_ms(500);
        unsafe { esp_restart() };
    }
}

/// Device id from the factory-programmed base MAC.
pub struct EfuseIdentity {
    mac: [u8; 6],
}

impl EfuseIdentity {
    pub fn new() -> Result<Self, EspError> {
        let mut mac = [0u8; 6];
        esp!(unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) })?;
        Ok(Self { mac })
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }
}

impl DeviceIdentity for EfuseIdentity {
    fn device_id(&self) -> u64 {
        super::mac_to_id(self.mac)
    }
}

/// Manifest requests through the IDF HTTP client (HTTP and HTTPS).
pub struct EspManifestClient {
    timeout: Duration,
}

impl EspManifestClient {
    pub fn new() -> Self {
        Self {
            timeout: MANIFEST_TIMEOUT,
        }
    }
}

impl Default for EspManifestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGet for EspManifestClient {
    fn get(&mut self, url: &str) -> Result<HttpResponse, BoxError> {
        let connection = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        })?;
        let mut client = Client::wrap(connection);

        let headers = [("Connection", "close"), ("Cache-Control", "no-cache")];
        let request = client.request(Method::Get, url, &headers)?;
        let mut response = request.submit()?;
        let status = response.status();

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_MANIFEST_LEN {
                return Err(format!("manifest larger than {} bytes", MAX_MANIFEST_LEN).into());
            }
            body.extend_from_slice(&buf[..n]);
        }

        Ok(HttpResponse { status, body })
    }
}

/// Bring up the station interface and block until DHCP completes.
pub fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    ssid: &str,
    password: &str,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    log::info!("Initializing WiFi for SSID: '{}'", ssid);

    if ssid.is_empty() {
        log::error!("WiFi SSID is empty! Check wifi_config.h");
        bail!("WiFi SSID cannot be empty");
    }

    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let cfg = Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid SSID format: {}", ssid))?,
        password: password
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
        auth_method: if password.is_empty() {
            log::warn!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    });
    wifi.set_configuration(&cfg)?;

    wifi.start()?;
    log::info!("Connecting to {}...", ssid);
    wifi.connect()?;

    log::info!("Waiting for DHCP...");
    wifi.wait_netif_up()?;

    if let Ok(ip_info) = wifi.wifi().sta_netif().get_ip_info() {
        log::info!("WiFi connected, IP: {}", ip_info.ip);
    }
    Ok(wifi)
}
