//! Key comparators for ordered backends.

use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Total order over keys, selected per database instance.
///
/// The comparator defines iteration order and range-seek semantics for
/// ordered backends. Unordered backends ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyComparator {
    /// Plain byte-wise lexical order. The default.
    #[default]
    Lexical,
    /// Keys parsed as decimal integers; non-numeric keys fall back to
    /// byte order and sort after all numeric keys.
    Decimal,
    /// Keys parsed as decimal real numbers, same fallback rule.
    RealNumber,
}

impl KeyComparator {
    /// Parses a comparator name from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the unknown comparator.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "decimal" => Ok(Self::Decimal),
            "realnumber" | "real_number" => Ok(Self::RealNumber),
            other => Err(Error::invalid_argument(format!(
                "unknown key comparator: {other}"
            ))),
        }
    }

    /// Returns the configuration name of this comparator.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Decimal => "decimal",
            Self::RealNumber => "realnumber",
        }
    }

    /// Returns the on-disk code of this comparator.
    #[must_use]
    pub(crate) const fn as_byte(self) -> u8 {
        match self {
            Self::Lexical => 0,
            Self::Decimal => 1,
            Self::RealNumber => 2,
        }
    }

    /// Decodes an on-disk comparator code.
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Lexical),
            1 => Some(Self::Decimal),
            2 => Some(Self::RealNumber),
            _ => None,
        }
    }

    /// Compares two keys under this order.
    #[must_use]
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Self::Lexical => a.cmp(b),
            Self::Decimal => match (parse_decimal(a), parse_decimal(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.cmp(b),
            },
            Self::RealNumber => match (parse_real(a), parse_real(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| a.cmp(b)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.cmp(b),
            },
        }
    }
}

fn parse_decimal(key: &[u8]) -> Option<i64> {
    std::str::from_utf8(key).ok()?.trim().parse().ok()
}

fn parse_real(key: &[u8]) -> Option<f64> {
    let value: f64 = std::str::from_utf8(key).ok()?.trim().parse().ok()?;
    // NaN keys would break the total order; treat them as non-numeric.
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// A key wrapper giving `BTreeMap` a runtime-selected comparator.
///
/// Every key in one map must carry the same comparator; the ordered
/// backends guarantee this by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrderedKey {
    pub(crate) bytes: Vec<u8>,
    cmp: KeyComparator,
}

impl OrderedKey {
    pub(crate) fn new(bytes: Vec<u8>, cmp: KeyComparator) -> Self {
        Self { bytes, cmp }
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.bytes, &other.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_is_byte_order() {
        let c = KeyComparator::Lexical;
        assert_eq!(c.compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(c.compare(b"abc", b"ab"), Ordering::Greater);
        assert_eq!(c.compare(b"", b""), Ordering::Equal);
    }

    #[test]
    fn decimal_orders_numerically() {
        let c = KeyComparator::Decimal;
        assert_eq!(c.compare(b"9", b"10"), Ordering::Less);
        assert_eq!(c.compare(b"-5", b"3"), Ordering::Less);
        assert_eq!(c.compare(b"100", b"100"), Ordering::Equal);
    }

    #[test]
    fn decimal_sorts_non_numeric_after_numeric() {
        let c = KeyComparator::Decimal;
        assert_eq!(c.compare(b"42", b"apple"), Ordering::Less);
        assert_eq!(c.compare(b"apple", b"42"), Ordering::Greater);
        assert_eq!(c.compare(b"apple", b"banana"), Ordering::Less);
    }

    #[test]
    fn real_number_orders_by_value() {
        let c = KeyComparator::RealNumber;
        assert_eq!(c.compare(b"2.5", b"10.0"), Ordering::Less);
        assert_eq!(c.compare(b"-0.5", b"0.25"), Ordering::Less);
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert!(KeyComparator::parse("lexical").is_ok());
        assert!(KeyComparator::parse("Decimal").is_ok());
        let err = KeyComparator::parse("reverse").unwrap_err();
        assert!(err.to_string().contains("reverse"));
    }

    #[test]
    fn ordered_key_uses_selected_comparator() {
        let a = OrderedKey::new(b"9".to_vec(), KeyComparator::Decimal);
        let b = OrderedKey::new(b"10".to_vec(), KeyComparator::Decimal);
        assert!(a < b);

        let a = OrderedKey::new(b"9".to_vec(), KeyComparator::Lexical);
        let b = OrderedKey::new(b"10".to_vec(), KeyComparator::Lexical);
        assert!(a > b);
    }
}
