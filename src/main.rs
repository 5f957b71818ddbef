use anyhow::Result;

mod config;
mod logging;
mod platform;
mod version;

#[cfg(not(target_os = "espidf"))]
mod cli;

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use std::time::Duration;

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
    use ota_core::{TcpConnector, Updater};

    use crate::platform::esp::{
        connect_wifi, mark_running_app_valid, EfuseIdentity, EspFlashTarget, EspManifestClient,
        EspRestart,
    };

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const MIN_CHECK_INTERVAL_SECS: u64 = 30;

    esp_idf_svc::sys::link_patches();

    logging::init_logger("info")
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;
    log::info!("ESP32 JSON OTA {}", version::version_info());
    log::info!("Free heap: {} bytes", unsafe {
        esp_idf_sys::esp_get_free_heap_size()
    });

    // Reaching this point means the image boots
    mark_running_app_valid();

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = config::load_or_default(&nvs);
    logging::set_level(&config.log_level);

    let _wifi = connect_wifi(
        peripherals.modem,
        sys_loop,
        nvs,
        &config.wifi_ssid,
        &config.wifi_password,
    )?;

    let identity = EfuseIdentity::new()?;
    log::info!("Device MAC: {}", platform::format_mac(identity.mac()));

    let mut updater = Updater::new(
        config.ota_config(version::firmware_version()),
        TcpConnector::with_connect_timeout(CONNECT_TIMEOUT),
        EspFlashTarget::new(),
        EspRestart,
    );
    let mut http = EspManifestClient::new();

    let interval = Duration::from_secs(config.check_interval_secs.max(MIN_CHECK_INTERVAL_SECS));
    log::info!(
        "Checking {} every {}s",
        updater.config().manifest_url,
        interval.as_secs()
    );

    loop {
        match updater.check_and_update(&mut http, &identity) {
            Ok(Some(written)) => log::warn!("Wrote {} bytes but the restart returned", written),
            Ok(None) => {}
            Err(e) => log::warn!("Update attempt failed: {}", e),
        }
        std::thread::sleep(interval);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    cli::run()
}
