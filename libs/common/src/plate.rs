//! License plate normalisation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A license plate in canonical form: upper-case, no whitespace or dashes.
///
/// Plates are compared in canonical form everywhere (car lookup, guest
/// lookup, notifications), so `"abc-123"`, `"ABC 123"` and `"ABC123"` are
/// the same plate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Plate(String);

impl Plate {
    /// Normalise raw input. Returns `None` when nothing alphanumeric remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_uppercase)
            .collect();

        if canonical.is_empty() || !canonical.chars().all(char::is_alphanumeric) {
            return None;
        }
        Some(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Plate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Plate::parse(&value).ok_or_else(|| format!("invalid license plate: {value:?}"))
    }
}

impl From<Plate> for String {
    fn from(plate: Plate) -> Self {
        plate.0
    }
}
