//! Serialization dispatch.
//!
//! Two decode paths: driver-owned entity shapes go through the internal
//! decoder, everything else through the custom decoder that applies the
//! caller's conversion rules. Both honor the negotiated wire format. An
//! absent body, or a caller expecting no result, decodes to `None` rather
//! than an error; a body that cannot be decoded into the requested shape
//! is always a fatal serialization error.

use serde::{de::DeserializeOwned, Serialize};

use crate::entity::Entity;
use crate::protocol::{codec, DriverError, DriverResult, Response, WireFormat};

#[derive(Debug, Clone, Copy)]
pub struct Serialization {
    format: WireFormat,
}

impl Serialization {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn serialize<T: Serialize>(&self, value: &T) -> DriverResult<Vec<u8>> {
        codec::encode(self.format, value)
    }

    /// Decodes a driver-owned entity shape.
    pub fn deserialize_internal<T: Entity>(&self, data: &[u8]) -> DriverResult<T> {
        codec::decode(self.format, data)
    }

    /// Decodes a user-supplied shape.
    pub fn deserialize_custom<T: DeserializeOwned>(&self, data: &[u8]) -> DriverResult<T> {
        codec::decode(self.format, data)
    }

    /// Applies the custom conversion rules to an already-decoded value,
    /// used for the elements of a cursor batch.
    pub fn custom_from_value<T: DeserializeOwned>(
        &self,
        value: serde_json::Value,
    ) -> DriverResult<T> {
        serde_json::from_value(value)
            .map_err(|e| DriverError::Serialization(format!("result conversion failed: {}", e)))
    }

    pub(crate) fn internal_result<T: Entity>(&self, response: &Response) -> DriverResult<Option<T>> {
        match &response.body {
            Some(body) if response.code != 404 => Ok(Some(self.deserialize_internal(body)?)),
            _ => Ok(None),
        }
    }

    pub(crate) fn custom_result<T: DeserializeOwned>(
        &self,
        response: &Response,
    ) -> DriverResult<Option<T>> {
        match &response.body {
            Some(body) if response.code != 404 => Ok(Some(self.deserialize_custom(body)?)),
            _ => Ok(None),
        }
    }
}
