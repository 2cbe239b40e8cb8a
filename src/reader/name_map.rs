//! Field-name vocabularies of the structure readers.
//!
//! Each record kind has a small static vocabulary; lookups are a linear scan
//! with lazy ASCII comparison, so a name arriving in any encoding matches
//! without transcoding. Vocabularies are tiny (under ten entries), a scan
//! beats a map here.

use crate::value::{codec, AtomicValue};

pub struct NameMap {
    record: &'static str,
    names: &'static [&'static str],
}

impl NameMap {
    pub const fn new(record: &'static str, names: &'static [&'static str]) -> NameMap {
        NameMap { record, names }
    }

    pub fn name(&self, idx: usize) -> &'static str {
        self.names[idx]
    }

    /// Index of a field name given as an atomic value. Only string names
    /// match; anything else is an unknown field.
    pub fn index(&self, v: &AtomicValue) -> Option<usize> {
        match v {
            AtomicValue::Str(s) => self.names.iter().position(|n| codec::eq_ascii(s, n)),
            _ => None,
        }
    }

    /// Unknown-field error for a name that failed to match.
    pub fn unknown(&self, v: &AtomicValue) -> crate::error::BindError {
        let field = crate::value::convert::to_string(v).unwrap_or_else(|_| "<obj>".to_string());
        crate::error::BindError::UnknownField {
            record: self.record,
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringEncoding;

    static MAP: NameMap = NameMap::new("term", &["type", "value", "variable", "len"]);

    #[test]
    fn test_index_any_encoding() {
        let utf16 = AtomicValue::Str(codec::encode("variable", StringEncoding::Utf16Be));
        assert_eq!(MAP.index(&utf16), Some(2));
        assert_eq!(MAP.index(&AtomicValue::string("len")), Some(3));
        assert_eq!(MAP.index(&AtomicValue::string("length")), None);
        assert_eq!(MAP.index(&AtomicValue::Int(0)), None);
    }

    #[test]
    fn test_unknown_error_names_record_and_field() {
        let e = MAP.unknown(&AtomicValue::string("weight"));
        assert_eq!(e.to_string(), "unknown field 'weight' in term structure");
    }
}
