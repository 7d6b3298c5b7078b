//! A serde wrapper for binary fields that browsers transmit as base64 text.

use serde::de::{Error, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt;

use crate::error::WebauthnError;

/// Binary data that serialises as URL-safe base64 without padding, and that
/// forgives the other common base64 alphabets when deserialising.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Base64UrlSafeData(pub Vec<u8>);

static ALLOWED_DECODING_FORMATS: &[base64::Config] = &[
    base64::URL_SAFE_NO_PAD,
    base64::URL_SAFE,
    base64::STANDARD,
    base64::STANDARD_NO_PAD,
];

fn decode_forgiving(v: &str) -> Option<Vec<u8>> {
    ALLOWED_DECODING_FORMATS
        .iter()
        .find_map(|config| base64::decode_config(v, *config).ok())
}

impl fmt::Display for Base64UrlSafeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD))
    }
}

impl From<Vec<u8>> for Base64UrlSafeData {
    fn from(v: Vec<u8>) -> Self {
        Base64UrlSafeData(v)
    }
}

impl From<&[u8]> for Base64UrlSafeData {
    fn from(v: &[u8]) -> Self {
        Base64UrlSafeData(v.to_vec())
    }
}

impl From<Base64UrlSafeData> for Vec<u8> {
    fn from(d: Base64UrlSafeData) -> Self {
        d.0
    }
}

impl TryFrom<&str> for Base64UrlSafeData {
    type Error = WebauthnError;

    fn try_from(v: &str) -> Result<Self, Self::Error> {
        decode_forgiving(v)
            .map(Base64UrlSafeData)
            .ok_or_else(|| WebauthnError::Parse(format!("{} is not valid base64", v)))
    }
}

impl AsRef<[u8]> for Base64UrlSafeData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for Base64UrlSafeData {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct Base64UrlSafeDataVisitor;

impl<'de> Visitor<'de> for Base64UrlSafeDataVisitor {
    type Value = Base64UrlSafeData;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a base64 url encoded string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        // Forgive alt base64 decoding formats
        decode_forgiving(v)
            .map(Base64UrlSafeData)
            .ok_or_else(|| serde::de::Error::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Base64UrlSafeData(v.to_vec()))
    }
}

impl<'de> Deserialize<'de> for Base64UrlSafeData {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(Base64UrlSafeDataVisitor)
    }
}

impl Serialize for Base64UrlSafeData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD);
        serializer.serialize_str(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forgives_alternate_alphabets() {
        let urlsafe: Base64UrlSafeData = serde_json::from_str("\"-_8\"").unwrap();
        let standard: Base64UrlSafeData = serde_json::from_str("\"+/8=\"").unwrap();
        assert_eq!(urlsafe, standard);
        assert_eq!(urlsafe.0, vec![0xfb, 0xff]);
    }

    #[test]
    fn serialises_without_padding() {
        let d = Base64UrlSafeData(vec![0xfb, 0xff]);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"-_8\"");
        assert_eq!(d.to_string(), "-_8");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Base64UrlSafeData::try_from("not base64 !!").is_err());
        assert!(serde_json::from_str::<Base64UrlSafeData>("\"%%%\"").is_err());
    }
}
