//! Build-time configuration helpers.

/// Parses a decimal millivolt value such as `"5030"`.
///
/// Usable in const context so configuration given through environment
/// variables is validated when the firmware is compiled.
pub const fn parse_millivolts(value: &str) -> Option<u16> {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut acc: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            return None;
        }
        acc = acc * 10 + (digit - b'0') as u32;
        if acc > u16::MAX as u32 {
            return None;
        }
        i += 1;
    }
    Some(acc as u16)
}
