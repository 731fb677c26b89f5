//! Pair Identity
//!
//! A structured key for an instrument pair. The orientation matters:
//! `first:second` means `spread = price(first) - hedge_ratio * price(second)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator used in persisted column labels
pub const PAIR_SEPARATOR: char = ':';

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PairKeyError {
    #[error("Pair label must look like 'SYM1:SYM2', got '{0}'")]
    Malformed(String),
    #[error("Pair legs must be different symbols, got '{0}' twice")]
    SameSymbol(String),
}

/// Ordered pair of symbols
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub first: String,
    pub second: String,
}

impl PairKey {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Result<Self, PairKeyError> {
        let first = first.into().trim().to_string();
        let second = second.into().trim().to_string();
        if first.is_empty() || second.is_empty() {
            return Err(PairKeyError::Malformed(format!("{}{}{}", first, PAIR_SEPARATOR, second)));
        }
        if first == second {
            return Err(PairKeyError::SameSymbol(first));
        }
        Ok(Self { first, second })
    }

    /// Parse a `"SYM1:SYM2"` column label
    pub fn parse(label: &str) -> Result<Self, PairKeyError> {
        let mut parts = label.split(PAIR_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => Self::new(a, b),
            _ => Err(PairKeyError::Malformed(label.to_string())),
        }
    }

    /// Column label in `"{first}:{second}"` form
    pub fn label(&self) -> String {
        format!("{}{}{}", self.first, PAIR_SEPARATOR, self.second)
    }

    /// Same pair with the legs swapped
    pub fn reversed(&self) -> Self {
        Self {
            first: self.second.clone(),
            second: self.first.clone(),
        }
    }

    /// Lexicographically sorted orientation, used for de-duplication
    pub fn canonical(&self) -> Self {
        if self.first <= self.second {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// True when both keys name the same two symbols in either order
    pub fn same_symbols(&self, other: &PairKey) -> bool {
        self == other || (self.first == other.second && self.second == other.first)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.first == symbol || self.second == symbol
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.first, PAIR_SEPARATOR, self.second)
    }
}

/// Find a value keyed by pair, trying the exact orientation first and the
/// reversed one second. Returns the stored key alongside the value.
pub fn lookup_either<'a, T>(
    entries: impl IntoIterator<Item = (&'a PairKey, &'a T)>,
    key: &PairKey,
) -> Option<(&'a PairKey, &'a T)>
where
    T: 'a,
{
    let mut reversed_hit = None;
    for (stored, value) in entries {
        if stored == key {
            return Some((stored, value));
        }
        if reversed_hit.is_none() && stored.first == key.second && stored.second == key.first {
            reversed_hit = Some((stored, value));
        }
    }
    reversed_hit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_label() {
        let key = PairKey::parse("ALT/USDT:ZIL/USDT").unwrap();
        assert_eq!(key.first, "ALT/USDT");
        assert_eq!(key.second, "ZIL/USDT");
        assert_eq!(key.label(), "ALT/USDT:ZIL/USDT");
        assert_eq!(key.to_string(), key.label());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(PairKey::parse("BTCUSDT"), Err(PairKeyError::Malformed(_))));
        assert!(matches!(PairKey::parse("A:B:C"), Err(PairKeyError::Malformed(_))));
        assert!(matches!(PairKey::parse(":B"), Err(PairKeyError::Malformed(_))));
        assert!(matches!(PairKey::parse("X:X"), Err(PairKeyError::SameSymbol(_))));
    }

    #[test]
    fn test_canonical_and_reverse() {
        let key = PairKey::new("ZIL", "ALT").unwrap();
        assert_eq!(key.canonical(), PairKey::new("ALT", "ZIL").unwrap());
        assert_eq!(key.reversed().reversed(), key);
        assert!(key.same_symbols(&key.reversed()));
        assert!(key.contains("ZIL"));
        assert!(!key.contains("BTC"));
    }

    #[test]
    fn test_lookup_prefers_exact_orientation() {
        let ab = PairKey::new("A", "B").unwrap();
        let ba = ab.reversed();
        let entries = vec![(ba.clone(), 2.0), (ab.clone(), 1.0)];

        let (stored, value) = lookup_either(entries.iter().map(|(k, v)| (k, v)), &ab).unwrap();
        assert_eq!(stored, &ab);
        assert_eq!(*value, 1.0);
    }

    #[test]
    fn test_lookup_falls_back_to_reverse() {
        let ab = PairKey::new("A", "B").unwrap();
        let entries = vec![(ab.clone(), 1.0)];

        let (stored, value) =
            lookup_either(entries.iter().map(|(k, v)| (k, v)), &ab.reversed()).unwrap();
        assert_eq!(stored, &ab);
        assert_eq!(*value, 1.0);

        let missing = PairKey::new("A", "C").unwrap();
        assert!(lookup_either(entries.iter().map(|(k, v)| (k, v)), &missing).is_none());
    }
}
