//! Redacted wrapper for credential values.
//!
//! Passwords resolved for a connection are always handed out as [`Secret`],
//! whatever form the underlying variable source stored them in.

use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A string wrapper that prevents the value from being logged.
///
/// Formatting and serialization show `[REDACTED]` instead of the actual
/// value. Equality is value-based. Use [`Secret::expose`] to access the
/// payload when handing it to the transport.
///
/// # Example
///
/// ```rust
/// use rustible_transport::secret::Secret;
///
/// let password = Secret::new("hunter2");
/// assert_eq!(password.to_string(), "[REDACTED]");
/// assert_eq!(password.expose(), "hunter2");
/// ```
#[derive(Clone)]
pub struct Secret {
    value: String,
}

impl Secret {
    /// Create a new secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Expose the underlying value.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Consume and return the underlying value.
    pub fn into_inner(self) -> String {
        self.value
    }

    /// Check if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

// No Deref to str: reading the payload must go through expose().

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Secret {}

impl std::hash::Hash for Secret {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl serde::Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> serde::Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Wrap `value` in a [`Secret`] if present.
///
/// Absent stays absent; an absent password never becomes an empty secret.
pub fn optional_secret<S: Into<String>>(value: Option<S>) -> Option<Secret> {
    value.map(Secret::new)
}
