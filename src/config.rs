use anyhow::{Context, Result};
use ota_core::{ImageKind, OtaConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_MANIFEST_URL: &str = "http://update.local/esp32-json-ota/check.json";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    // WiFi settings
    #[serde(default)]
    pub wifi_ssid: String,
    #[serde(default)]
    pub wifi_password: String,

    // OTA settings
    pub app_name: String,
    pub manifest_url: String,
    #[serde(default)]
    pub include_device_id: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Area written by forced updates when none is named
    #[serde(default)]
    pub image_kind: ImageKind,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        // WiFi credentials come from wifi_config.h via build.rs
        Self {
            wifi_ssid: env!("WIFI_SSID").to_string(),
            wifi_password: env!("WIFI_PASSWORD").to_string(),
            app_name: env!("CARGO_PKG_NAME").to_string(),
            manifest_url: option_env!("OTA_MANIFEST_URL")
                .unwrap_or(DEFAULT_MANIFEST_URL)
                .to_string(),
            include_device_id: false,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            image_kind: ImageKind::Firmware,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Invalid configuration JSON")
    }

    /// Engine configuration for the running firmware version.
    pub fn ota_config(&self, current_version: u32) -> OtaConfig {
        OtaConfig::new(
            self.app_name.clone(),
            self.image_kind,
            current_version,
            self.manifest_url.clone(),
        )
        .with_device_id(self.include_device_id)
    }
}

#[cfg(target_os = "espidf")]
pub use nvs::load_or_default;

#[cfg(target_os = "espidf")]
mod nvs {
    use super::Config;
    use anyhow::Result;
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

    const CONFIG_NAMESPACE: &str = "json_ota";
    const CONFIG_KEY: &str = "config";

    impl Config {
        pub fn save(&self, partition: &EspDefaultNvsPartition) -> Result<()> {
            let mut nvs = open(partition)?;
            let data = serde_json::to_vec(self)?;
            nvs.set_blob(CONFIG_KEY, &data)?;
            log::info!("Configuration saved to NVS");
            Ok(())
        }
    }

    fn open(partition: &EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>> {
        Ok(EspNvs::new(partition.clone(), CONFIG_NAMESPACE, true)?)
    }

    pub fn load_or_default(partition: &EspDefaultNvsPartition) -> Config {
        match load_from_nvs(partition) {
            Ok(mut config) => {
                log::info!("Loaded configuration from NVS");

                // If NVS has empty WiFi credentials, use the compiled-in ones
                if config.wifi_ssid.is_empty() {
                    let default_config = Config::default();
                    log::warn!(
                        "NVS WiFi credentials empty, using compiled defaults: SSID='{}'",
                        default_config.wifi_ssid
                    );
                    config.wifi_ssid = default_config.wifi_ssid;
                    config.wifi_password = default_config.wifi_password;

                    if let Err(e) = config.save(partition) {
                        log::warn!("Failed to save updated config with WiFi credentials: {:?}", e);
                    }
                }

                config
            }
            Err(e) => {
                log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
                let config = Config::default();

                // Try to save default config to NVS for next time
                if let Err(save_err) = config.save(partition) {
                    log::warn!("Failed to save default config to NVS: {:?}", save_err);
                }

                config
            }
        }
    }

    fn load_from_nvs(partition: &EspDefaultNvsPartition) -> Result<Config> {
        let nvs = open(partition)?;

        let mut buf = vec![0u8; 2048]; // Max config size
        let data = nvs
            .get_blob(CONFIG_KEY, &mut buf)?
            .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

        Config::from_json(data)
    }
}

/// Host runs read the configuration from a JSON file, or use defaults.
#[cfg(not(target_os = "espidf"))]
pub fn load_or_default(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config = Config::from_json(&data)?;
            log::info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}
