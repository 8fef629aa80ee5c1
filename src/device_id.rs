//! # Device Identifiers
//!
//! A device has two equivalent forms: a 32-bit unsigned integer (the form
//! used as the Store's key component) and an 8-hex-digit string prefixed
//! with `!` (the form carried on the wire as `gatewayId`/`channelId`-adjacent
//! fields). Conversion between the two is bijective.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device id must be prefixed with '!': {0}")]
    MissingPrefix(String),

    #[error("device id must be exactly 8 hex digits: {0}")]
    WrongLength(String),

    #[error("invalid hex digits in device id: {0}")]
    InvalidHex(String),
}

/// A device's numeric identifier, with bijective hex-string conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub fn from_numeric(value: u32) -> Self {
        DeviceId(value)
    }

    pub fn numeric(&self) -> u32 {
        self.0
    }

    /// Parses the `!015ba416`-style hex form into a [`DeviceId`].
    pub fn from_hex(hex: &str) -> Result<Self, DeviceIdError> {
        let digits = hex
            .strip_prefix('!')
            .ok_or_else(|| DeviceIdError::MissingPrefix(hex.to_string()))?;

        if digits.len() != 8 {
            return Err(DeviceIdError::WrongLength(hex.to_string()));
        }

        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| DeviceIdError::InvalidHex(hex.to_string()))?;

        Ok(DeviceId(value))
    }

    /// Renders the bijective `!{8 lower-case hex digits}` form.
    pub fn to_hex(&self) -> String {
        format!("!{:08x}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        DeviceId(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hex_to_numeric_known_value() {
        let id = DeviceId::from_hex("!015ba416").unwrap();
        assert_eq!(id.numeric(), 0x015b_a416);
    }

    #[test]
    fn numeric_to_hex_round_trip() {
        let id = DeviceId::from_numeric(0x015b_a416);
        assert_eq!(id.to_hex(), "!015ba416");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(
            DeviceId::from_hex("015ba416"),
            Err(DeviceIdError::MissingPrefix("015ba416".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(DeviceId::from_hex("!015ba4").is_err());
        assert!(DeviceId::from_hex("!015ba41600").is_err());
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(DeviceId::from_hex("!015bag16").is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip_hex_numeric(value in any::<u32>()) {
            let id = DeviceId::from_numeric(value);
            let hex = id.to_hex();
            let parsed = DeviceId::from_hex(&hex).unwrap();
            prop_assert_eq!(parsed.numeric(), value);
        }
    }
}
