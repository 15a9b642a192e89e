use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const KEY_LENGTH: usize = 32;

/// Single-use token sent with every mutating form submission. The client
/// re-sends the same token when it retries the same logical action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("idempotency key is missing")]
    Missing,
    #[error("idempotency key must be 32 characters, got {0}")]
    Length(usize),
    #[error("idempotency key contains invalid character '{0}'")]
    Character(char),
}

impl IdempotencyKey {
    /// Draws a fresh key from the operating system's random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
        encoded.truncate(KEY_LENGTH);
        Self(encoded)
    }

    pub fn parse(value: &str) -> Result<Self, KeyError> {
        if value.is_empty() {
            return Err(KeyError::Missing);
        }
        let length = value.chars().count();
        if length != KEY_LENGTH {
            return Err(KeyError::Length(length));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(KeyError::Character(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_well_formed_and_distinct() {
        let a = IdempotencyKey::generate();
        let b = IdempotencyKey::generate();

        assert_eq!(a.as_str().len(), KEY_LENGTH);
        assert_eq!(IdempotencyKey::parse(a.as_str()), Ok(a.clone()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert_eq!(IdempotencyKey::parse(""), Err(KeyError::Missing));
        assert_eq!(IdempotencyKey::parse("short"), Err(KeyError::Length(5)));
        assert_eq!(
            IdempotencyKey::parse("abcdefghijklmnopqrstuvwxyz01234!"),
            Err(KeyError::Character('!'))
        );
    }
}
