//! Text codec for the string payloads of the value model.
//!
//! Strings cross the boundary in one of seven encodings and are stored as raw
//! byte buffers with an explicit encoding tag, never null-terminated. The
//! codec converts between them and UTF-8, and supports ASCII comparison and
//! prefix tests that transcode lazily, one code unit at a time, without
//! materializing a converted copy.

use crate::error::{BindError, BindResult};

/// Encoding tag of a string payload. The unsuffixed UTF-16/32 variants mean
/// "platform byte order" and resolve at use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    Utf16Be,
    Utf16Le,
    /// UTF-16 in platform byte order.
    Utf16,
    Utf32Be,
    Utf32Le,
    /// UTF-32 in platform byte order.
    Utf32,
}

impl StringEncoding {
    /// Resolve the platform-endianness variants to a concrete byte order.
    pub fn resolve(self) -> StringEncoding {
        match self {
            StringEncoding::Utf16 => {
                if cfg!(target_endian = "big") {
                    StringEncoding::Utf16Be
                } else {
                    StringEncoding::Utf16Le
                }
            }
            StringEncoding::Utf32 => {
                if cfg!(target_endian = "big") {
                    StringEncoding::Utf32Be
                } else {
                    StringEncoding::Utf32Le
                }
            }
            other => other,
        }
    }

    /// Size of one code unit in bytes.
    pub fn unit_size(self) -> usize {
        match self.resolve() {
            StringEncoding::Utf8 => 1,
            StringEncoding::Utf16Be | StringEncoding::Utf16Le => 2,
            StringEncoding::Utf32Be | StringEncoding::Utf32Le => 4,
            _ => unreachable!(),
        }
    }

    /// Parse an encoding name as it appears in host configuration
    /// ("UTF-8", "utf16le", "UTF-32BE", ...).
    pub fn from_name(name: &str) -> Option<StringEncoding> {
        let mut key = String::with_capacity(name.len());
        for c in name.chars() {
            if c != '-' && c != '_' {
                key.extend(c.to_lowercase());
            }
        }
        match key.as_str() {
            "utf8" => Some(StringEncoding::Utf8),
            "utf16be" => Some(StringEncoding::Utf16Be),
            "utf16le" => Some(StringEncoding::Utf16Le),
            "utf16" => Some(StringEncoding::Utf16),
            "utf32be" => Some(StringEncoding::Utf32Be),
            "utf32le" => Some(StringEncoding::Utf32Le),
            "utf32" => Some(StringEncoding::Utf32),
            _ => None,
        }
    }
}

/// A string payload: raw bytes plus the encoding they are in.
#[derive(Debug, Clone)]
pub struct EncodedString {
    pub encoding: StringEncoding,
    pub bytes: Vec<u8>,
}

impl EncodedString {
    pub fn new(encoding: StringEncoding, bytes: Vec<u8>) -> Self {
        EncodedString { encoding, bytes }
    }

    pub fn from_utf8(s: impl Into<String>) -> Self {
        EncodedString {
            encoding: StringEncoding::Utf8,
            bytes: s.into().into_bytes(),
        }
    }

    /// Number of code units (not bytes, not characters).
    pub fn unit_len(&self) -> usize {
        self.bytes.len() / self.encoding.unit_size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for EncodedString {
    /// Content equality across encodings: equal iff both decode to the same
    /// character sequence. Falls back to false on malformed input.
    fn eq(&self, other: &Self) -> bool {
        if self.encoding.resolve() == other.encoding.resolve() {
            return self.bytes == other.bytes;
        }
        match (decode(self), decode(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Decode an encoded string to UTF-8.
pub fn decode(s: &EncodedString) -> BindResult<String> {
    match s.encoding.resolve() {
        StringEncoding::Utf8 => match std::str::from_utf8(&s.bytes) {
            Ok(v) => Ok(v.to_string()),
            Err(_) => Err(BindError::Encoding("invalid UTF-8 sequence")),
        },
        StringEncoding::Utf16Be => decode_utf16(&s.bytes, u16::from_be_bytes),
        StringEncoding::Utf16Le => decode_utf16(&s.bytes, u16::from_le_bytes),
        StringEncoding::Utf32Be => decode_utf32(&s.bytes, u32::from_be_bytes),
        StringEncoding::Utf32Le => decode_utf32(&s.bytes, u32::from_le_bytes),
        _ => unreachable!(),
    }
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> BindResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(BindError::Encoding("truncated UTF-16 code unit"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| read([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| BindError::Encoding("unpaired UTF-16 surrogate"))
}

fn decode_utf32(bytes: &[u8], read: fn([u8; 4]) -> u32) -> BindResult<String> {
    if bytes.len() % 4 != 0 {
        return Err(BindError::Encoding("truncated UTF-32 code unit"));
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for c in bytes.chunks_exact(4) {
        let cp = read([c[0], c[1], c[2], c[3]]);
        match char::from_u32(cp) {
            Some(ch) => out.push(ch),
            None => return Err(BindError::Encoding("invalid UTF-32 code point")),
        }
    }
    Ok(out)
}

/// Encode a UTF-8 string into the requested encoding.
pub fn encode(s: &str, encoding: StringEncoding) -> EncodedString {
    let bytes = match encoding.resolve() {
        StringEncoding::Utf8 => s.as_bytes().to_vec(),
        StringEncoding::Utf16Be => s
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect(),
        StringEncoding::Utf16Le => s
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect(),
        StringEncoding::Utf32Be => s
            .chars()
            .flat_map(|c| (c as u32).to_be_bytes())
            .collect(),
        StringEncoding::Utf32Le => s
            .chars()
            .flat_map(|c| (c as u32).to_le_bytes())
            .collect(),
        _ => unreachable!(),
    };
    EncodedString { encoding, bytes }
}

/// Encode into a bounded destination buffer, returning the number of bytes
/// written. The destination being too small is an error, not a truncation.
pub fn encode_into(s: &str, encoding: StringEncoding, dest: &mut [u8]) -> BindResult<usize> {
    let encoded = encode(s, encoding);
    if encoded.bytes.len() > dest.len() {
        return Err(BindError::BufferOverflow);
    }
    dest[..encoded.bytes.len()].copy_from_slice(&encoded.bytes);
    Ok(encoded.bytes.len())
}

/// Iterator over the code units of an encoded string, widened to u32.
/// Used by the lazy ASCII operations; never allocates.
fn units(s: &EncodedString) -> impl Iterator<Item = u32> + '_ {
    let enc = s.encoding.resolve();
    s.bytes
        .chunks_exact(enc.unit_size())
        .map(move |c| match enc {
            StringEncoding::Utf8 => c[0] as u32,
            StringEncoding::Utf16Be => u16::from_be_bytes([c[0], c[1]]) as u32,
            StringEncoding::Utf16Le => u16::from_le_bytes([c[0], c[1]]) as u32,
            StringEncoding::Utf32Be => u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
            StringEncoding::Utf32Le => u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
            _ => unreachable!(),
        })
}

/// ASCII equality against `cmp` without materializing a transcoded copy.
/// Any non-ASCII code unit on either side makes the comparison false.
pub fn eq_ascii(s: &EncodedString, cmp: &str) -> bool {
    if !cmp.is_ascii() {
        return false;
    }
    let mut cu = cmp.bytes();
    for unit in units(s) {
        match cu.next() {
            Some(b) if unit == b as u32 => {}
            _ => return false,
        }
    }
    cu.next().is_none()
}

/// ASCII prefix test, lazy like `eq_ascii`.
pub fn starts_with_ascii(s: &EncodedString, prefix: &str) -> bool {
    if !prefix.is_ascii() {
        return false;
    }
    let mut cu = prefix.bytes();
    for unit in units(s) {
        match cu.next() {
            None => return true,
            Some(b) if unit == b as u32 => {}
            Some(_) => return false,
        }
    }
    cu.next().is_none()
}

/// First code unit, widened. `None` for the empty string.
pub fn first_unit(s: &EncodedString) -> Option<u32> {
    units(s).next()
}

/// Transcode to an ASCII string, failing on any code unit outside ASCII.
/// Used for tokens with a fixed ASCII vocabulary (numbers, operators).
pub fn to_ascii(s: &EncodedString) -> BindResult<String> {
    let mut out = String::with_capacity(s.unit_len());
    for unit in units(s) {
        if unit == 0 || unit > 127 {
            return Err(BindError::Encoding("non-ASCII code unit where ASCII expected"));
        }
        out.push(unit as u8 as char);
    }
    Ok(out)
}

/// Everything after the first code unit, decoded to UTF-8.
pub fn tail_string(s: &EncodedString) -> BindResult<String> {
    let skip = s.encoding.resolve().unit_size();
    if s.bytes.len() < skip {
        return Ok(String::new());
    }
    decode(&EncodedString::new(s.encoding, s.bytes[skip..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_roundtrip() {
        let s = "hello wörld \u{1F600}";
        for enc in [StringEncoding::Utf16Be, StringEncoding::Utf16Le, StringEncoding::Utf16] {
            let e = encode(s, enc);
            assert_eq!(decode(&e).unwrap(), s);
        }
    }

    #[test]
    fn test_utf32_roundtrip() {
        let s = "abc \u{00E9}\u{1F600}";
        for enc in [StringEncoding::Utf32Be, StringEncoding::Utf32Le, StringEncoding::Utf32] {
            let e = encode(s, enc);
            assert_eq!(decode(&e).unwrap(), s);
        }
    }

    #[test]
    fn test_truncated_unit_is_encoding_error() {
        let bad = EncodedString::new(StringEncoding::Utf16Le, vec![0x61, 0x00, 0x62]);
        assert!(matches!(decode(&bad), Err(BindError::Encoding(_))));
    }

    #[test]
    fn test_unpaired_surrogate_is_encoding_error() {
        let bad = EncodedString::new(StringEncoding::Utf16Be, vec![0xD8, 0x00]);
        assert!(matches!(decode(&bad), Err(BindError::Encoding(_))));
    }

    #[test]
    fn test_eq_ascii_lazy() {
        let e = encode("doctype", StringEncoding::Utf16Be);
        assert!(eq_ascii(&e, "doctype"));
        assert!(!eq_ascii(&e, "doctypes"));
        assert!(!eq_ascii(&e, "doctyp"));
        let nonascii = encode("döctype", StringEncoding::Utf16Le);
        assert!(!eq_ascii(&nonascii, "doctype"));
    }

    #[test]
    fn test_prefix_and_tail() {
        let e = encode("=var", StringEncoding::Utf32Le);
        assert!(starts_with_ascii(&e, "="));
        assert_eq!(first_unit(&e), Some(b'=' as u32));
        assert_eq!(tail_string(&e).unwrap(), "var");
    }

    #[test]
    fn test_encode_into_bounded() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_into("ab", StringEncoding::Utf16Le, &mut buf).unwrap(), 4);
        assert_eq!(&buf, &[0x61, 0x00, 0x62, 0x00]);
        let mut small = [0u8; 3];
        assert!(matches!(
            encode_into("ab", StringEncoding::Utf16Le, &mut small),
            Err(BindError::BufferOverflow)
        ));
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(StringEncoding::from_name("UTF-8"), Some(StringEncoding::Utf8));
        assert_eq!(StringEncoding::from_name("utf16le"), Some(StringEncoding::Utf16Le));
        assert_eq!(StringEncoding::from_name("UTF-32BE"), Some(StringEncoding::Utf32Be));
        assert_eq!(StringEncoding::from_name("latin1"), None);
    }

    #[test]
    fn test_cross_encoding_equality() {
        let a = encode("term", StringEncoding::Utf8);
        let b = encode("term", StringEncoding::Utf32Be);
        assert_eq!(a, b);
    }
}
