//! Hex helpers for frame dumps in log output

use std::fmt::Write;

/// Encode bytes to lowercase hex without separators
/// Example: [0x12, 0x34, 0xAB] -> "1234ab"
pub fn encode_lower(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to String buffer is infallible
        let _ = write!(&mut result, "{:02x}", byte);
    }
    result
}

/// Encode bytes to uppercase hex, space separated
/// Example: [0xAA, 0x55, 0x01] -> "AA 55 01"
pub fn encode_spaced(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}
