//! Tracking marker for subscriber nodes.
//!
//! The marker is the tag a tree node carries while its component declares
//! subscriptions. The subscriber index queries the tree by this tag.

use crate::error::ConfigurationError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Marker used when none is configured.
pub const DEFAULT_MARKER: &str = "subscriber";

/// Validate a marker name.
///
/// # Errors
///
/// Returns an error unless the name is non-empty and made of ASCII letters,
/// digits, `-` and `_`.
pub fn validate_marker(name: &str) -> Result<(), ConfigurationError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidMarker(name.to_string()))
    }
}

/// A validated tracking marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Marker(Arc<str>);

impl Marker {
    /// Create a marker from a name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidMarker`] if the name is invalid.
    pub fn new(name: &str) -> Result<Self, ConfigurationError> {
        validate_marker(name)?;
        Ok(Self(Arc::from(name)))
    }

    /// Get the marker name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_MARKER))
    }
}

impl FromStr for Marker {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
