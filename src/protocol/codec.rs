//! Wire-format encoding.
//!
//! The driver negotiates one of two body encodings per client: UTF-8 JSON
//! text or MessagePack. The chunked socket transport always uses
//! MessagePack.

use serde::{de::DeserializeOwned, Serialize};

use super::error::{DriverError, DriverResult};

/// Upper bound for a single encoded message on either transport.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Body encoding negotiated at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    MessagePack,
}

impl WireFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::MessagePack => "application/x-msgpack",
        }
    }
}

pub fn encode<T: Serialize>(format: WireFormat, value: &T) -> DriverResult<Vec<u8>> {
    let payload = match format {
        WireFormat::Json => serde_json::to_vec(value)
            .map_err(|e| DriverError::Serialization(format!("JSON encoding failed: {}", e)))?,
        WireFormat::MessagePack => rmp_serde::to_vec_named(value)
            .map_err(|e| DriverError::Serialization(format!("MessagePack encoding failed: {}", e)))?,
    };

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(DriverError::MessageTooLarge);
    }
    Ok(payload)
}

pub fn decode<T: DeserializeOwned>(format: WireFormat, data: &[u8]) -> DriverResult<T> {
    match format {
        WireFormat::Json => serde_json::from_slice(data)
            .map_err(|e| DriverError::Serialization(format!("JSON decoding failed: {}", e))),
        WireFormat::MessagePack => rmp_serde::from_slice(data)
            .map_err(|e| DriverError::Serialization(format!("MessagePack decoding failed: {}", e))),
    }
}
