//! Geographic reference data identifiers.

use serde::{Deserialize, Serialize};

/// Level of a location in the province → district → ward hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationTier {
    Province,
    District,
    Ward,
}

impl std::fmt::Display for LocationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Province => write!(f, "province"),
            Self::District => write!(f, "district"),
            Self::Ward => write!(f, "ward"),
        }
    }
}

/// Ward identifier.
///
/// Carriers key wards by an opaque code (e.g., `"20308"`) rather than a
/// number, so this wraps a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WardCode(String);

impl WardCode {
    /// Create a ward code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WardCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WardCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}
