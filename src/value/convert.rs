//! Encoding-aware conversions between atomic value representations.
//!
//! Numeric conversions keep the boundary's historical semantics: truncating
//! a double to an integer first nudges it by single-precision epsilon so
//! values infinitesimally below an integer convert to that integer. The
//! single-precision constant is intentional, kept for compatibility with the
//! wire behavior hosts already depend on; do not widen it to `f64::EPSILON`.

use super::codec::{self, EncodedString, StringEncoding};
use super::AtomicValue;
use crate::error::{BindError, BindResult};

/// Truncation tolerance for double to integer conversion.
const TRUNC_EPSILON: f64 = f32::EPSILON as f64;

// 2^63 and 2^64 as doubles; both exact.
const I64_UPPER: f64 = 9_223_372_036_854_775_807i64 as f64;
const I64_LOWER: f64 = -9_223_372_036_854_775_808i64 as f64;
const U64_UPPER: f64 = 18_446_744_073_709_551_615u64 as f64;

fn double_to_int(v: f64) -> BindResult<i64> {
    if v.is_nan() || v >= I64_UPPER || v < I64_LOWER {
        return Err(BindError::OutOfRange("double does not fit a 64-bit integer"));
    }
    if v >= 0.0 {
        Ok((v + TRUNC_EPSILON) as i64)
    } else {
        Ok((v - TRUNC_EPSILON) as i64)
    }
}

fn double_to_uint(v: f64) -> BindResult<u64> {
    if v.is_nan() || v >= U64_UPPER || v < 0.0 {
        return Err(BindError::OutOfRange("double does not fit an unsigned 64-bit integer"));
    }
    Ok((v + TRUNC_EPSILON) as u64)
}

fn ascii_token(s: &EncodedString) -> BindResult<String> {
    let t = codec::to_ascii(s)?;
    Ok(t.trim().to_string())
}

pub fn to_int(v: &AtomicValue) -> BindResult<i64> {
    match v {
        AtomicValue::Int(i) => Ok(*i),
        AtomicValue::UInt(u) => i64::try_from(*u)
            .map_err(|_| BindError::OutOfRange("unsigned value does not fit a signed integer")),
        AtomicValue::Double(d) => double_to_int(*d),
        AtomicValue::Bool(b) => Ok(*b as i64),
        AtomicValue::Str(s) => {
            let t = ascii_token(s)?;
            if let Ok(i) = t.parse::<i64>() {
                Ok(i)
            } else if let Ok(d) = t.parse::<f64>() {
                double_to_int(d)
            } else {
                Err(BindError::type_error(format!("cannot convert string '{t}' to integer")))
            }
        }
        other => Err(BindError::type_error(format!(
            "cannot convert {} to integer",
            other.type_name()
        ))),
    }
}

pub fn to_uint(v: &AtomicValue) -> BindResult<u64> {
    match v {
        AtomicValue::UInt(u) => Ok(*u),
        AtomicValue::Int(i) => u64::try_from(*i)
            .map_err(|_| BindError::OutOfRange("negative value for unsigned integer")),
        AtomicValue::Double(d) => double_to_uint(*d),
        AtomicValue::Bool(b) => Ok(*b as u64),
        AtomicValue::Str(s) => {
            let t = ascii_token(s)?;
            if let Ok(u) = t.parse::<u64>() {
                Ok(u)
            } else if let Ok(d) = t.parse::<f64>() {
                double_to_uint(d)
            } else {
                Err(BindError::type_error(format!(
                    "cannot convert string '{t}' to unsigned integer"
                )))
            }
        }
        other => Err(BindError::type_error(format!(
            "cannot convert {} to unsigned integer",
            other.type_name()
        ))),
    }
}

pub fn to_double(v: &AtomicValue) -> BindResult<f64> {
    match v {
        AtomicValue::Double(d) => Ok(*d),
        AtomicValue::Int(i) => Ok(*i as f64),
        AtomicValue::UInt(u) => Ok(*u as f64),
        AtomicValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        AtomicValue::Str(s) => {
            let t = ascii_token(s)?;
            t.parse::<f64>()
                .map_err(|_| BindError::type_error(format!("cannot convert string '{t}' to double")))
        }
        other => Err(BindError::type_error(format!(
            "cannot convert {} to double",
            other.type_name()
        ))),
    }
}

pub fn to_bool(v: &AtomicValue) -> BindResult<bool> {
    match v {
        AtomicValue::Bool(b) => Ok(*b),
        AtomicValue::Int(i) => Ok(*i != 0),
        AtomicValue::UInt(u) => Ok(*u != 0),
        AtomicValue::Double(d) => Ok(d.abs() > TRUNC_EPSILON),
        AtomicValue::Str(s) => {
            if s.unit_len() == 1 {
                // only ASCII units may match the single-char vocabulary
                if let Some(u) = codec::first_unit(s).filter(|u| *u <= 0x7F) {
                    match (u as u8).to_ascii_lowercase() {
                        b'1' | b'y' | b't' => return Ok(true),
                        b'0' | b'n' | b'f' => return Ok(false),
                        _ => {}
                    }
                }
            }
            Ok(to_int(v)? != 0)
        }
        other => Err(BindError::type_error(format!(
            "cannot convert {} to boolean",
            other.type_name()
        ))),
    }
}

/// Convert to a UTF-8 string. Doubles print with 15 significant digits,
/// integers in canonical decimal, booleans as `true`/`false`.
pub fn to_string(v: &AtomicValue) -> BindResult<String> {
    match v {
        AtomicValue::Str(s) => codec::decode(s),
        AtomicValue::Int(i) => Ok(i.to_string()),
        AtomicValue::UInt(u) => Ok(u.to_string()),
        AtomicValue::Double(d) => Ok(format_double(*d)),
        AtomicValue::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        other => Err(BindError::type_error(format!(
            "cannot convert {} to string",
            other.type_name()
        ))),
    }
}

/// Convert to a string in the requested encoding.
pub fn to_encoded_string(v: &AtomicValue, encoding: StringEncoding) -> BindResult<EncodedString> {
    match v {
        AtomicValue::Str(s) if s.encoding.resolve() == encoding.resolve() => Ok(s.clone()),
        other => Ok(codec::encode(&to_string(other)?, encoding)),
    }
}

/// Normalize an atomic value to its numeric representation. Strings are
/// sniffed: a decimal point or exponent makes a double, a leading minus a
/// signed integer, plain digits an unsigned integer.
pub fn to_numeric(v: &AtomicValue) -> BindResult<AtomicValue> {
    match v {
        AtomicValue::Int(_) | AtomicValue::UInt(_) | AtomicValue::Double(_) => Ok(v.clone()),
        AtomicValue::Bool(b) => Ok(AtomicValue::Int(*b as i64)),
        AtomicValue::Str(s) => {
            let t = ascii_token(s)?;
            if t.is_empty() {
                return Err(BindError::type_error("empty string where number expected"));
            }
            if t.bytes().any(|b| b == b'.' || b == b'e' || b == b'E') {
                Ok(AtomicValue::Double(to_double(v)?))
            } else if t.starts_with('-') {
                Ok(AtomicValue::Int(to_int(v)?))
            } else {
                Ok(AtomicValue::UInt(to_uint(v)?))
            }
        }
        other => Err(BindError::type_error(format!(
            "cannot convert {} to number",
            other.type_name()
        ))),
    }
}

/// Print a double with up to 15 significant digits (C's `%.15g` shape):
/// fixed notation for exponents in [-4, 15), exponential otherwise,
/// trailing zeros trimmed.
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{:.14e}", v);
    let (mant, exp) = sci.split_once('e').expect("scientific notation");
    let exp: i32 = exp.parse().expect("exponent");
    let neg = mant.starts_with('-');
    let all_digits: String = mant.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = all_digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };

    let mut out = String::new();
    if neg {
        out.push('-');
    }
    if !(-4..15).contains(&exp) {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        if exp < 0 {
            out.push('-');
        } else {
            out.push('+');
        }
        out.push_str(&format!("{:02}", exp.abs()));
    } else if exp < 0 {
        out.push_str("0.");
        for _ in 0..(-exp - 1) {
            out.push('0');
        }
        out.push_str(digits);
    } else {
        let point = (exp as usize) + 1;
        if digits.len() <= point {
            out.push_str(digits);
            for _ in digits.len()..point {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..point]);
            out.push('.');
            out.push_str(&digits[point..]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_POW_53: i64 = 1 << 53;

    #[test]
    fn test_double_to_int_exact_at_2_pow_53() {
        let v = AtomicValue::Double(TWO_POW_53 as f64);
        assert_eq!(to_int(&v).unwrap(), TWO_POW_53);
        // fractions beyond 2^53 are not representable; the nearest double
        // is the integer itself
        let v = AtomicValue::Double(TWO_POW_53 as f64 + 0.4);
        assert_eq!(to_int(&v).unwrap(), TWO_POW_53);
    }

    #[test]
    fn test_double_to_int_truncates_fraction() {
        assert_eq!(to_int(&AtomicValue::Double(3.7)).unwrap(), 3);
        assert_eq!(to_int(&AtomicValue::Double(-3.7)).unwrap(), -3);
        // just below an integer converts to that integer
        assert_eq!(to_int(&AtomicValue::Double(4.999_999_9)).unwrap(), 5);
        assert_eq!(to_int(&AtomicValue::Double(-4.999_999_9)).unwrap(), -5);
    }

    #[test]
    fn test_double_beyond_integer_range_is_out_of_range() {
        let too_big = AtomicValue::Double(2.0f64.powi(63));
        assert!(matches!(to_int(&too_big), Err(BindError::OutOfRange(_))));
        let too_small = AtomicValue::Double(-2.0f64.powi(64));
        assert!(matches!(to_int(&too_small), Err(BindError::OutOfRange(_))));
        let neg = AtomicValue::Double(-1.0);
        assert!(matches!(to_uint(&neg), Err(BindError::OutOfRange(_))));
        let nan = AtomicValue::Double(f64::NAN);
        assert!(matches!(to_int(&nan), Err(BindError::OutOfRange(_))));
    }

    #[test]
    fn test_uint_int_cross_range() {
        assert!(matches!(
            to_int(&AtomicValue::UInt(u64::MAX)),
            Err(BindError::OutOfRange(_))
        ));
        assert!(matches!(
            to_uint(&AtomicValue::Int(-1)),
            Err(BindError::OutOfRange(_))
        ));
        assert_eq!(to_int(&AtomicValue::UInt(7)).unwrap(), 7);
        assert_eq!(to_uint(&AtomicValue::Int(7)).unwrap(), 7);
    }

    #[test]
    fn test_string_to_int_any_encoding() {
        let v = AtomicValue::Str(codec::encode("-42", StringEncoding::Utf16Be));
        assert_eq!(to_int(&v).unwrap(), -42);
        let v = AtomicValue::Str(codec::encode(" 37 ", StringEncoding::Utf32Le));
        assert_eq!(to_uint(&v).unwrap(), 37);
        let v = AtomicValue::string("12.9");
        assert_eq!(to_int(&v).unwrap(), 12);
        let v = AtomicValue::string("not a number");
        assert!(matches!(to_int(&v), Err(BindError::Type(_))));
    }

    #[test]
    fn test_to_bool_single_char_vocabulary() {
        for s in ["1", "y", "Y", "t", "T"] {
            assert!(to_bool(&AtomicValue::string(s)).unwrap(), "{s}");
        }
        for s in ["0", "n", "N", "f", "F"] {
            assert!(!to_bool(&AtomicValue::string(s)).unwrap(), "{s}");
        }
        assert!(to_bool(&AtomicValue::string("17")).unwrap());
        assert!(!to_bool(&AtomicValue::string("0000")).unwrap());
        assert!(matches!(
            to_bool(&AtomicValue::string("maybe")),
            Err(BindError::Type(_))
        ));
    }

    #[test]
    fn test_to_bool_single_unit_must_be_ascii() {
        // U+0131 shares its low byte with '1' but is not in the vocabulary
        let v = AtomicValue::Str(codec::encode("\u{0131}", StringEncoding::Utf16Le));
        assert!(to_bool(&v).is_err());
        let v = AtomicValue::Str(codec::encode("\u{0131}", StringEncoding::Utf32Be));
        assert!(to_bool(&v).is_err());
    }

    #[test]
    fn test_to_bool_double_epsilon_band() {
        assert!(!to_bool(&AtomicValue::Double(0.0)).unwrap());
        assert!(!to_bool(&AtomicValue::Double(1e-9)).unwrap());
        assert!(to_bool(&AtomicValue::Double(0.5)).unwrap());
        assert!(to_bool(&AtomicValue::Double(-0.5)).unwrap());
    }

    #[test]
    fn test_format_double_15_significant_digits() {
        assert_eq!(format_double(0.0), "0");
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(-2.25), "-2.25");
        assert_eq!(format_double(0.1 + 0.2), "0.3");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(0.00001), "1e-05");
        assert_eq!(format_double(1e16), "1e+16");
        assert_eq!(format_double(12345.678), "12345.678");
        assert_eq!(format_double(TWO_POW_53 as f64), "9.00719925474099e+15");
    }

    #[test]
    fn test_string_roundtrip_numeric() {
        for v in [0.5f64, -12.25, 3.0, 0.1] {
            let s = to_string(&AtomicValue::Double(v)).unwrap();
            assert_eq!(s.parse::<f64>().unwrap(), v);
        }
        assert_eq!(to_string(&AtomicValue::Int(-9)).unwrap(), "-9");
        assert_eq!(to_string(&AtomicValue::UInt(u64::MAX)).unwrap(), u64::MAX.to_string());
        assert_eq!(to_string(&AtomicValue::Bool(true)).unwrap(), "true");
    }

    #[test]
    fn test_to_numeric_sniffing() {
        assert_eq!(to_numeric(&AtomicValue::string("5")).unwrap(), AtomicValue::UInt(5));
        assert_eq!(to_numeric(&AtomicValue::string("-5")).unwrap(), AtomicValue::Int(-5));
        assert_eq!(to_numeric(&AtomicValue::string("5.5")).unwrap(), AtomicValue::Double(5.5));
        assert_eq!(to_numeric(&AtomicValue::string("1e3")).unwrap(), AtomicValue::Double(1000.0));
        assert!(to_numeric(&AtomicValue::string("five")).is_err());
    }

    #[test]
    fn test_to_encoded_string() {
        let v = AtomicValue::Int(12);
        let e = to_encoded_string(&v, StringEncoding::Utf16Le).unwrap();
        assert_eq!(codec::decode(&e).unwrap(), "12");
    }
}
