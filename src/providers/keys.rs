//! Static master-key provider.

use super::KeyProvider;
use crate::error::DispatchError;
use crate::message::Headers;
use std::collections::HashMap;
use tracing::{info, warn};

/// Name of the master key.
pub const MASTER_KEY: &str = "master";
/// Default header carrying the master key.
pub const DEFAULT_MASTER_KEY_HEADER: &str = "Master-Key";

/// Holds a fixed set of named keys, generating the master key when none is configured.
pub struct StaticKeyProvider {
    keys: HashMap<String, String>,
    header: String,
}

impl StaticKeyProvider {
    pub fn new(master_key: Option<String>, header: impl Into<String>) -> Self {
        let master = master_key.unwrap_or_else(|| {
            let key = generate_key();
            info!(master_key = %truncate_key(&key), "Master key generated");
            key
        });
        let mut keys = HashMap::new();
        keys.insert(MASTER_KEY.to_string(), master);
        Self {
            keys,
            header: header.into(),
        }
    }

    /// The current master key.
    pub fn master_key(&self) -> &str {
        self.keys.get(MASTER_KEY).map(String::as_str).unwrap_or("")
    }
}

impl KeyProvider for StaticKeyProvider {
    fn is_key_valid(&self, name: &str, key: &str) -> bool {
        self.keys
            .get(name)
            .map(|expected| expected.eq_ignore_ascii_case(key))
            .unwrap_or(false)
    }

    fn check_key_permissions(&self, headers: &Headers) -> Result<bool, DispatchError> {
        let presented = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&self.header))
            .and_then(|(_, values)| values.first());
        let Some(key) = presented else {
            return Ok(false);
        };
        if !self.is_key_valid(MASTER_KEY, key) {
            return Err(DispatchError::Unauthorized("Master key is not valid.".into()));
        }
        warn!(master_key = %truncate_key(key), "Request contains a valid master key.");
        Ok(true)
    }

    fn master_key_header(&self) -> &str {
        &self.header
    }
}

/// 32 random bytes, hex encoded.
fn generate_key() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Keeps the first and last ten characters of a key for logging.
pub(crate) fn truncate_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 20 {
        return "***".to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{}...{}", head, tail)
}
