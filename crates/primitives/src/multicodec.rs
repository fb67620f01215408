//! Minimal multiformats helpers: unsigned varints and multicodec headers.

/// Appends `value` to `buf` as an unsigned LEB128 varint.
pub fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        #[expect(clippy::cast_possible_truncation, reason = "Masked to 7 bits")]
        buf.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    #[expect(clippy::cast_possible_truncation, reason = "Value is below 0x80")]
    buf.push(value as u8);
}

/// Builds the multicodec header for `path`: `uvarint(len + 1) || path || '\n'`.
#[must_use]
pub fn header(path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(path.len() + 2);
    write_uvarint(&mut buf, path.len() as u64 + 1);
    buf.extend_from_slice(path.as_bytes());
    buf.push(b'\n');
    buf
}

/// Strips `header` from the front of `data`, if present.
#[must_use]
pub fn strip_header<'a>(data: &'a [u8], header: &[u8]) -> Option<&'a [u8]> {
    data.strip_prefix(header)
}
