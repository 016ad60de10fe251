//! Device identity derived from the ESP32 factory MAC address.
//!
//! The 12-digit uppercase hex MAC is the Device object's serial number and
//! the suffix of the LwM2M endpoint name (`<prefix><MAC>`), so the
//! endpoint is stable across reboots and unique per board.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// `AABBCCDDEEFF`.
pub type SerialString = heapless::String<12>;

/// Endpoint prefix (up to 32 bytes) plus the serial.
pub type EndpointString = heapless::String<44>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: mac is a 6-byte out-buffer as the API requires.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK as i32 {
        log::warn!("device_id: eFuse MAC read failed (rc={})", ret);
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn serial_number(mac: &MacAddress) -> SerialString {
    let mut s = SerialString::new();
    for b in mac {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// Endpoint client name. A prefix too long for the buffer is truncated at
/// a char boundary; the serial is always kept whole.
pub fn endpoint_name(prefix: &str, mac: &MacAddress) -> EndpointString {
    let serial = serial_number(mac);
    let room = EndpointString::new().capacity() - serial.len();
    let mut cut = prefix.len().min(room);
    while !prefix.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut name = EndpointString::new();
    let _ = name.push_str(&prefix[..cut]);
    let _ = name.push_str(&serial);
    name
}
