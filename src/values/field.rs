//! Typed field values and their sortable byte encoding
//!
//! Every value is stored as bytes whose lexicographic order matches the
//! natural order of the type:
//! - keyword: raw UTF-8
//! - long / date: 8 bytes big-endian with the sign bit flipped
//! - double: 8 bytes big-endian of the IEEE bits, negatives inverted

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

const SIGN_BIT: u64 = 1 << 63;

/// Kind of values a field holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Keyword,
    Long,
    Double,
    Date,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldKind::Keyword)
    }
}

/// A single field value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Keyword(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Keyword(_) => FieldKind::Keyword,
            FieldValue::Long(_) => FieldKind::Long,
            FieldValue::Double(_) => FieldKind::Double,
            FieldValue::Date(_) => FieldKind::Date,
        }
    }

    /// Sortable byte encoding
    pub fn encode(&self) -> Bytes {
        match self {
            FieldValue::Keyword(s) => Bytes::copy_from_slice(s.as_bytes()),
            FieldValue::Long(v) => encode_long(*v),
            FieldValue::Double(v) => encode_double(*v),
            FieldValue::Date(d) => encode_long(d.timestamp_millis()),
        }
    }

    /// Rough heap + inline footprint, used for RAM accounting
    pub fn ram_bytes(&self) -> usize {
        std::mem::size_of::<FieldValue>()
            + match self {
                FieldValue::Keyword(s) => s.len(),
                _ => 0,
            }
    }
}

fn encode_long(v: i64) -> Bytes {
    Bytes::copy_from_slice(&((v as u64) ^ SIGN_BIT).to_be_bytes())
}

fn encode_double(v: f64) -> Bytes {
    let bits = v.to_bits();
    let sortable = if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    };
    Bytes::copy_from_slice(&sortable.to_be_bytes())
}

fn fixed8(bytes: &[u8], kind: FieldKind) -> Result<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        StrataError::corrupt(format!(
            "{:?} value must be 8 bytes, found {}",
            kind,
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(array))
}

fn decode_long(bytes: &[u8], kind: FieldKind) -> Result<i64> {
    Ok((fixed8(bytes, kind)? ^ SIGN_BIT) as i64)
}

fn decode_double(bytes: &[u8]) -> Result<f64> {
    let sortable = fixed8(bytes, FieldKind::Double)?;
    let bits = if sortable & SIGN_BIT != 0 {
        sortable ^ SIGN_BIT
    } else {
        !sortable
    };
    Ok(f64::from_bits(bits))
}

fn keyword(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| StrataError::corrupt(format!("keyword not utf-8: {}", e)))
}

/// Decode an encoded value of `kind` back into a typed value
pub fn decode_value(kind: FieldKind, bytes: &[u8]) -> Result<FieldValue> {
    Ok(match kind {
        FieldKind::Keyword => FieldValue::Keyword(keyword(bytes)?.to_string()),
        FieldKind::Long => FieldValue::Long(decode_long(bytes, kind)?),
        FieldKind::Double => FieldValue::Double(decode_double(bytes)?),
        FieldKind::Date => FieldValue::Date(millis_to_date(decode_long(bytes, kind)?)?),
    })
}

/// Numeric projection of an encoded value
pub fn decode_as_double(kind: FieldKind, bytes: &[u8]) -> Result<f64> {
    match kind {
        FieldKind::Long | FieldKind::Date => Ok(decode_long(bytes, kind)? as f64),
        FieldKind::Double => decode_double(bytes),
        FieldKind::Keyword => {
            let s = keyword(bytes)?;
            s.trim()
                .parse::<f64>()
                .map_err(|_| StrataError::corrupt(format!("keyword '{}' is not a number", s)))
        }
    }
}

/// Temporal projection of an encoded value (longs and doubles are epoch millis)
pub fn decode_as_date(kind: FieldKind, bytes: &[u8]) -> Result<DateTime<Utc>> {
    match kind {
        FieldKind::Long | FieldKind::Date => millis_to_date(decode_long(bytes, kind)?),
        FieldKind::Double => millis_to_date(decode_double(bytes)? as i64),
        FieldKind::Keyword => {
            let s = keyword(bytes)?;
            DateTime::parse_from_rfc3339(s.trim())
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| StrataError::corrupt(format!("keyword '{}' is not a date: {}", s, e)))
        }
    }
}

fn millis_to_date(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StrataError::corrupt(format!("{} millis is out of the date range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_preserves_order() {
        let longs = [i64::MIN, -5, -1, 0, 1, 42, i64::MAX];
        for pair in longs.windows(2) {
            assert!(encode_long(pair[0]) < encode_long(pair[1]));
        }

        let doubles = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1e-9, 3.25, f64::INFINITY];
        for pair in doubles.windows(2) {
            assert!(encode_double(pair[0]) <= encode_double(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_decode_typed() {
        let date = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        for value in [
            FieldValue::Keyword("red".to_string()),
            FieldValue::Long(-17),
            FieldValue::Double(-2.5),
            FieldValue::Date(date),
        ] {
            let decoded = decode_value(value.kind(), &value.encode()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_projections() {
        let long = FieldValue::Long(86_400_000).encode();
        assert_eq!(decode_as_double(FieldKind::Long, &long).unwrap(), 86_400_000.0);
        assert_eq!(
            decode_as_date(FieldKind::Long, &long).unwrap().to_rfc3339(),
            "1970-01-02T00:00:00+00:00"
        );

        let kw = FieldValue::Keyword(" 12.5 ".to_string()).encode();
        assert_eq!(decode_as_double(FieldKind::Keyword, &kw).unwrap(), 12.5);

        let kw_date = FieldValue::Keyword("2024-03-01T12:00:00Z".to_string()).encode();
        assert_eq!(
            decode_as_date(FieldKind::Keyword, &kw_date).unwrap().timestamp(),
            1_709_294_400
        );
    }

    #[test]
    fn test_decode_failures_are_corrupt_state() {
        let kw = FieldValue::Keyword("blue".to_string()).encode();
        let err = decode_as_double(FieldKind::Keyword, &kw).unwrap_err();
        assert!(matches!(err, StrataError::CorruptState(_)));
        assert!(err.is_fatal());

        assert!(matches!(
            decode_as_double(FieldKind::Long, &[1, 2, 3]),
            Err(StrataError::CorruptState(_))
        ));
        assert!(matches!(
            decode_as_date(FieldKind::Keyword, &kw),
            Err(StrataError::CorruptState(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let value: FieldValue = serde_json::from_str(r#"{"long": 5}"#).unwrap();
        assert_eq!(value, FieldValue::Long(5));
        let value: FieldValue = serde_json::from_str(r#"{"keyword": "a"}"#).unwrap();
        assert_eq!(value.kind(), FieldKind::Keyword);
    }
}
