use serde_json::Value;

/// Serializes `value` for an HTTP header.
///
/// Header values must be ASCII, so every code point at or above 0x7F is written as a JSON
/// `\uXXXX` escape (a surrogate pair above the BMP). The result parses back to the same value.
pub fn header_safe_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    let mut units = [0u16; 2];
    for ch in raw.chars() {
        if (ch as u32) < 0x7f {
            out.push(ch);
            continue;
        }
        for unit in ch.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{:04x}", unit));
        }
    }
    out
}
