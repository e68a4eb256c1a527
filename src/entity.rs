//! Driver-owned result shapes.
//!
//! These are the structured entities the server returns for system
//! endpoints. They decode through the internal path of the serialization
//! dispatch; arbitrary user documents go through the custom path instead.

use serde::Deserialize;

/// Marker for result shapes owned by the driver.
pub trait Entity: serde::de::DeserializeOwned {}

/// Credential issued by `POST /_open/auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtEntity {
    pub jwt: String,
}

impl Entity for JwtEntity {}

/// Error document carried in the body of a non-success response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEntity {
    #[serde(default)]
    pub error: bool,
    pub code: Option<u16>,
    #[serde(rename = "errorNum")]
    pub error_num: Option<i64>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl Entity for ErrorEntity {}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntity {
    pub server: Option<String>,
    pub version: String,
    pub license: Option<String>,
}

impl Entity for VersionEntity {}

/// Batch of query results from `POST /_api/cursor`.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorEntity {
    #[serde(default)]
    pub result: Vec<serde_json::Value>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
    pub id: Option<String>,
    pub count: Option<u64>,
}

impl Entity for CursorEntity {}

/// Key/id/revision triple returned by document write operations.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentMetaEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_rev")]
    pub rev: String,
}

impl Entity for DocumentMetaEntity {}
