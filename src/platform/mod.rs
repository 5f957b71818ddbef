// Board and host backends for the update engine's capabilities

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(not(target_os = "espidf"))]
pub mod host;

/// Device id reported to the update server: the factory MAC read as a
/// little-endian integer, so `24:0A:C4:...` shows up as `...C40A24`.
pub fn mac_to_id(mac: [u8; 6]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..6].copy_from_slice(&mac);
    u64::from_le_bytes(bytes)
}

/// Parse `AA:BB:CC:DD:EE:FF` (or `-` separated).
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split(|c| c == ':' || c == '-');
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

pub fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
