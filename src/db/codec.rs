//! String encoding for values kept in a storage slot.

use serde::{de::DeserializeOwned, Serialize};

use super::config_set::ConfigSet;
use super::store::{DbError, SlotStore};

/// Written in place of a value that fails to encode.
pub const ENCODE_FALLBACK: &str = "{}";

/// Encode `value` as a JSON string. Never fails.
pub fn encode_value<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::warn!("Codec: failed to encode value: {}", e);
        ENCODE_FALLBACK.to_string()
    })
}

/// Decode a JSON string, returning `None` on any parse or shape failure.
pub fn decode_value<T: DeserializeOwned>(raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::info!("Codec: discarding undecodable value: {}", e);
            None
        }
    }
}

/// Restore the configuration set from `key`, falling back to an empty set.
pub fn load_config_set(slots: &dyn SlotStore, key: &str) -> ConfigSet {
    match slots.load(key) {
        Ok(Some(raw)) => decode_value(&raw).unwrap_or_else(|| {
            tracing::warn!("Codec: slot {} is corrupt, starting with no targets", key);
            ConfigSet::default()
        }),
        Ok(None) => ConfigSet::default(),
        Err(e) => {
            tracing::error!("Codec: failed to read slot {}: {}", key, e);
            ConfigSet::default()
        }
    }
}

/// Encode the configuration set into `key`.
pub fn save_config_set(slots: &dyn SlotStore, key: &str, set: &ConfigSet) -> Result<(), DbError> {
    slots.save(key, &encode_value(set))
}
