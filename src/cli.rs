// Host runner: drive the update engine against a local directory

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use ota_core::{ImageKind, PlainHttpClient, TcpConnector, UpdateCheck, Updater};

use crate::config::{self, Config};
use crate::logging;
use crate::platform::host::{FileFlashTarget, HostIdentity, HostRestart};
use crate::platform::{format_mac, parse_mac};
use crate::version;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "esp32-json-ota")]
#[command(about = "JSON manifest OTA updater (host runner)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory standing in for the flash partitions
    #[arg(short, long, default_value = "flash")]
    out: PathBuf,

    /// Version to compare against instead of the built-in one
    #[arg(long)]
    current_version: Option<u32>,

    /// MAC address reported as device id
    #[arg(long)]
    mac: Option<String>,

    /// Largest image the flash directory accepts, in bytes
    #[arg(long)]
    capacity: Option<usize>,

    /// Log level (overrides the configuration)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the manifest and report whether an update is available
    Check,
    /// Check the manifest and install a newer image
    Update,
    /// Download an image from an explicit location, ignoring versions
    Force {
        /// Image host
        host: String,

        /// Absolute path of the image on the host
        path: String,

        #[arg(short, long, default_value_t = 80)]
        port: u16,

        /// Write the filesystem image instead of the firmware
        #[arg(long)]
        spiffs: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logger(cli.log_level.as_deref().unwrap_or("info"))
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let config = config::load_or_default(cli.config.as_deref())?;
    if cli.log_level.is_none() {
        logging::set_level(&config.log_level);
    }
    log::info!("ESP32 JSON OTA host runner {}", version::version_info());

    execute(&cli, &config).map(|_| ())
}

/// Run one command. Returns the number of bytes installed, if any.
fn execute(cli: &Cli, config: &Config) -> Result<Option<usize>> {
    let identity = match &cli.mac {
        Some(mac) => {
            let mac = parse_mac(mac).ok_or_else(|| anyhow!("Invalid MAC address: {}", mac))?;
            log::info!("Device MAC: {}", format_mac(mac));
            HostIdentity::from_mac(mac)
        }
        None => HostIdentity::from_hostname(),
    };

    let mut flash = FileFlashTarget::new(&cli.out);
    if let Some(capacity) = cli.capacity {
        flash = flash.with_capacity(capacity);
    }

    let current_version = cli.current_version.unwrap_or_else(version::firmware_version);
    let mut updater = Updater::new(
        config.ota_config(current_version),
        TcpConnector::with_connect_timeout(CONNECT_TIMEOUT),
        flash,
        HostRestart::default(),
    );
    let mut http = PlainHttpClient::new(
        TcpConnector::with_connect_timeout(CONNECT_TIMEOUT),
        MANIFEST_TIMEOUT,
    );

    let installed = match &cli.command {
        Commands::Check => {
            match updater.check_for_update(&mut http, &identity) {
                UpdateCheck::Available(target) => println!("Update available: {}", target),
                UpdateCheck::UpToDate { published, current } => {
                    println!("Up to date (published {}, running {})", published, current)
                }
                UpdateCheck::OtherApplication { name } => {
                    println!("Manifest is for another application: {}", name)
                }
                UpdateCheck::Failed(e) => return Err(e.into()),
            }
            None
        }
        Commands::Update => updater.check_and_update(&mut http, &identity)?,
        Commands::Force {
            host,
            path,
            port,
            spiffs,
        } => {
            let kind = if *spiffs {
                ImageKind::FilesystemImage
            } else {
                config.image_kind
            };
            Some(updater.force_update(host, *port, path, kind)?)
        }
    };

    match installed {
        Some(written) => {
            let dir = updater.flash().dir().display();
            println!("Installed {} bytes into {}", written, dir)
        }
        None if !matches!(cli.command, Commands::Check) => println!("Nothing to install"),
        None => {}
    }
    if updater.restarter().requested() {
        log::info!("Restart requested; the new image is in place");
    }
    Ok(installed)
}
