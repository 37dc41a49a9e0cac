//! Hex encoding for persisted fixed-width values.

/// Lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode exactly `N` bytes of hex. Any other length or a non-hex digit
/// yields `None`.
pub fn fixed_from_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}
