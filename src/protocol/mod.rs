//! Wire protocol definitions for the FabricDB driver
//!
//! Value types shared by both transports, the negotiated body encodings,
//! and the chunked framing used by the binary socket protocol.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod request;
pub mod response;

pub use chunk::{
    split_message, ChunkAssembler, ChunkHeader, CHUNK_DEFAULT_CONTENT_SIZE, CHUNK_MAX_HEADER_SIZE,
    CHUNK_MIN_HEADER_SIZE,
};
pub use codec::{WireFormat, MAX_MESSAGE_SIZE};
pub use error::{DriverError, DriverResult};
pub use request::{Request, Verb};
pub use response::Response;
