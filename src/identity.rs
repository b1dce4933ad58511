//! Host identity used to namespace topics and discovery ids

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Failed to read hostname: {0}")]
    Lookup(#[from] std::io::Error),

    #[error("Hostname '{0}' contains no usable characters")]
    Empty(String),
}

/// Sanitized short hostname. Only `[A-Za-z0-9_-]` survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity(String);

impl HostIdentity {
    /// Reads the OS hostname once.
    pub fn detect() -> Result<Self, IdentityError> {
        let raw = hostname::get()?;
        Self::from_hostname(&raw.to_string_lossy())
    }

    pub fn from_hostname(raw: &str) -> Result<Self, IdentityError> {
        let sanitized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();

        if sanitized.is_empty() {
            return Err(IdentityError::Empty(raw.to_string()));
        }
        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
