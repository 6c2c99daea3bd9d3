//! Identifier matching: every job/order identifier read from a raw table goes
//! through [`normalize`] before it is compared with anything else.

use std::fmt;

/// Normalized job/order key.
///
/// `Unmatched` is the sentinel for empty or absent input. It never matches
/// anything, including another `Unmatched`, so rows without an identifier are
/// never linked to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalId {
    Key(String),
    Unmatched,
}

impl CanonicalId {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Unmatched => None,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, Self::Unmatched)
    }

    /// True when both ids are real keys and equal.
    pub fn matches(&self, other: &CanonicalId) -> bool {
        match (self, other) {
            (Self::Key(a), Self::Key(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Unmatched => write!(f, "<unmatched>"),
        }
    }
}

/// Normalize a raw identifier.
///
/// Trims, strips spreadsheet artefacts (`"100575126.0"`, zero padding of
/// numeric ids), drops every non-alphanumeric separator and upper-cases.
pub fn normalize(raw: &str) -> CanonicalId {
    let trimmed = strip_float_suffix(raw.trim());

    let key: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect();

    if key.is_empty() {
        return CanonicalId::Unmatched;
    }

    CanonicalId::Key(strip_zero_padding(key))
}

/// Absent values normalize to `Unmatched`.
pub fn normalize_opt(raw: Option<&str>) -> CanonicalId {
    raw.map(normalize).unwrap_or(CanonicalId::Unmatched)
}

/// `normalize(a) == normalize(b)`, with `Unmatched` never equal to anything.
pub fn matches(a: &str, b: &str) -> bool {
    normalize(a).matches(&normalize(b))
}

/// `"100575126.0"` / `"100575126.00"` → `"100575126"`. Anything else is returned as-is.
fn strip_float_suffix(s: &str) -> &str {
    let Some((int_part, frac)) = s.split_once('.') else {
        return s;
    };
    let numeric_int = !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit());
    let zero_frac = !frac.is_empty() && frac.bytes().all(|b| b == b'0');
    if numeric_int && zero_frac {
        int_part
    } else {
        s
    }
}

fn strip_zero_padding(key: String) -> String {
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return key;
    }
    let stripped = key.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}
