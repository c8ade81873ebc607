//! Pluggable key-serialization strategy.
//!
//! Cache keys and diagnostic messages need a string form of an entity key.
//! Rather than override hooks on the store, a codec capability is injected.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Key encode/decode failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyCodecError {
    #[error("cannot decode key from {input:?}: {reason}")]
    Decode { input: String, reason: String },
}

/// Bidirectional string codec for an entity key type.
pub trait KeyCodec<K>: Send + Sync {
    /// Encode a key into its canonical string form.
    fn encode(&self, key: &K) -> String;

    /// Decode a key from its canonical string form.
    fn decode(&self, raw: &str) -> Result<K, KeyCodecError>;
}

/// Codec for UUID keys, the common case.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyCodec;

impl KeyCodec<Uuid> for UuidKeyCodec {
    fn encode(&self, key: &Uuid) -> String {
        key.to_string()
    }

    fn decode(&self, raw: &str) -> Result<Uuid, KeyCodecError> {
        Uuid::parse_str(raw).map_err(|e| KeyCodecError::Decode {
            input: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Codec for any key that round-trips through `Display`/`FromStr`.
#[derive(Debug, Clone, Copy)]
pub struct DisplayKeyCodec<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> Default for DisplayKeyCodec<K> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> DisplayKeyCodec<K> {
    /// Create a new display-based codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K> KeyCodec<K> for DisplayKeyCodec<K>
where
    K: Display + FromStr + Send + Sync,
    K::Err: Display,
{
    fn encode(&self, key: &K) -> String {
        key.to_string()
    }

    fn decode(&self, raw: &str) -> Result<K, KeyCodecError> {
        raw.parse().map_err(|e: K::Err| KeyCodecError::Decode {
            input: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_codec_roundtrip() {
        let codec = UuidKeyCodec;
        let id = Uuid::now_v7();
        let encoded = codec.encode(&id);
        assert_eq!(codec.decode(&encoded).unwrap(), id);
    }

    #[test]
    fn test_uuid_codec_decode_rejects_garbage() {
        let codec = UuidKeyCodec;
        let err = codec.decode("not-a-uuid").unwrap_err();
        assert!(matches!(err, KeyCodecError::Decode { .. }));
        assert!(format!("{}", err).contains("not-a-uuid"));
    }

    #[test]
    fn test_display_codec_for_integers() {
        let codec = DisplayKeyCodec::<i64>::new();
        assert_eq!(codec.encode(&42), "42");
        assert_eq!(codec.decode("42").unwrap(), 42);
        assert!(codec.decode("forty-two").is_err());
    }
}
