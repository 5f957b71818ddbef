use std::env;
use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF; host builds of the runner skip it
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    println!("cargo:rerun-if-changed=wifi_config.h");
    println!("cargo:rerun-if-env-changed=FIRMWARE_VERSION");

    // Read WiFi configuration if it exists
    let mut ssid = String::new();
    let mut password = String::new();
    let wifi_config_path = "wifi_config.h";
    if Path::new(wifi_config_path).exists() {
        let contents = fs::read_to_string(wifi_config_path)?;
        ssid = define_value(&contents, "#define WIFI_SSID").unwrap_or_default();
        password = define_value(&contents, "#define WIFI_PASSWORD").unwrap_or_default();
    } else {
        println!("cargo:warning=wifi_config.h not found! Copy wifi_config.h.example to wifi_config.h and add your credentials.");
    }
    println!("cargo:rustc-env=WIFI_SSID={}", ssid);
    println!("cargo:rustc-env=WIFI_PASSWORD={}", password);

    // Integer version compared against published manifests
    let version = match env::var("FIRMWARE_VERSION") {
        Ok(v) => v.trim().parse::<u32>()?,
        Err(_) => {
            let minor: u32 = env::var("CARGO_PKG_VERSION_MINOR")?.parse()?;
            let patch: u32 = env::var("CARGO_PKG_VERSION_PATCH")?.parse()?;
            minor * 1000 + patch
        }
    };
    println!("cargo:rustc-env=FIRMWARE_VERSION={}", version);

    Ok(())
}

fn define_value(contents: &str, define: &str) -> Option<String> {
    let line = contents.lines().find(|l| l.contains(define))?;
    line.split('"').nth(1).map(str::to_string)
}
