//! Chunked message framing for the binary socket transport.
//!
//! A message is split into one or more chunks. Every chunk starts with a
//! fixed header: chunk length (including the header), a combined
//! index/count field, and the message id. The first chunk of a multi-chunk
//! message additionally carries the total message length. Integers are
//! little-endian.
//!
//! The `chunkx` field packs two values: the first chunk of a message stores
//! `(number_of_chunks << 1) | 1`, every follower stores `chunk_index << 1`.
//! Receivers buffer chunks by message id until the accumulated payload
//! reaches the declared total.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{DriverError, DriverResult};

const WORD_BYTES: usize = 4;
const DWORD_BYTES: usize = 8;

/// Header size of a single-chunk message or a follower chunk.
pub const CHUNK_MIN_HEADER_SIZE: usize = WORD_BYTES + WORD_BYTES + DWORD_BYTES;
/// Header size of the first chunk of a multi-chunk message.
pub const CHUNK_MAX_HEADER_SIZE: usize = CHUNK_MIN_HEADER_SIZE + DWORD_BYTES;
/// Default upper bound for the content carried by one chunk.
pub const CHUNK_DEFAULT_CONTENT_SIZE: usize = 30000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub length: u32,
    pub chunkx: u32,
    pub message_id: u64,
    pub message_length: Option<u64>,
}

impl ChunkHeader {
    pub fn is_first(&self) -> bool {
        self.chunkx & 1 == 1
    }

    /// Number of chunks in the message. Only the first chunk declares it.
    pub fn chunk_count(&self) -> Option<u32> {
        self.is_first().then(|| self.chunkx >> 1)
    }

    /// Position of this chunk within its message. The first chunk is 0.
    pub fn chunk_index(&self) -> u32 {
        if self.is_first() {
            0
        } else {
            self.chunkx >> 1
        }
    }

    pub fn header_len(&self) -> usize {
        if self.message_length.is_some() {
            CHUNK_MAX_HEADER_SIZE
        } else {
            CHUNK_MIN_HEADER_SIZE
        }
    }

    pub fn content_len(&self) -> DriverResult<usize> {
        (self.length as usize)
            .checked_sub(self.header_len())
            .ok_or_else(|| {
                DriverError::Protocol(format!(
                    "chunk length {} is smaller than its header",
                    self.length
                ))
            })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.chunkx.to_le_bytes());
        out.extend_from_slice(&self.message_id.to_le_bytes());
        if let Some(total) = self.message_length {
            out.extend_from_slice(&total.to_le_bytes());
        }
    }
}

/// Splits an encoded message into wire-ready chunks of at most
/// `max_content` payload bytes each.
pub fn split_message(message_id: u64, payload: &[u8], max_content: usize) -> Vec<Vec<u8>> {
    let pieces: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(max_content).collect()
    };
    let n_chunks = pieces.len() as u32;

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let header = if i == 0 {
                ChunkHeader {
                    length: 0,
                    chunkx: (n_chunks << 1) | 1,
                    message_id,
                    message_length: (n_chunks > 1).then(|| payload.len() as u64),
                }
            } else {
                ChunkHeader {
                    length: 0,
                    chunkx: (i as u32) << 1,
                    message_id,
                    message_length: None,
                }
            };
            let mut chunk = Vec::with_capacity(header.header_len() + piece.len());
            let header = ChunkHeader {
                length: (header.header_len() + piece.len()) as u32,
                ..header
            };
            header.encode_into(&mut chunk);
            chunk.extend_from_slice(piece);
            chunk
        })
        .collect()
}

/// Reads one chunk from the stream. `max_content` bounds the payload a
/// single chunk may declare.
pub async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_content: usize,
) -> DriverResult<(ChunkHeader, Vec<u8>)> {
    let mut prefix = [0u8; CHUNK_MIN_HEADER_SIZE];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| DriverError::Transport(format!("chunk header read failed: {}", e)))?;

    let length = u32::from_le_bytes(prefix[0..4].try_into().unwrap());
    let chunkx = u32::from_le_bytes(prefix[4..8].try_into().unwrap());
    let message_id = u64::from_le_bytes(prefix[8..16].try_into().unwrap());

    let is_first = chunkx & 1 == 1;
    let message_length = if is_first && (chunkx >> 1) > 1 {
        let mut total = [0u8; DWORD_BYTES];
        reader
            .read_exact(&mut total)
            .await
            .map_err(|e| DriverError::Transport(format!("chunk header read failed: {}", e)))?;
        Some(u64::from_le_bytes(total))
    } else {
        None
    };

    let header = ChunkHeader {
        length,
        chunkx,
        message_id,
        message_length,
    };
    let content_len = header.content_len()?;
    if content_len > max_content {
        return Err(DriverError::Protocol(format!(
            "chunk declares {} content bytes, limit is {}",
            content_len, max_content
        )));
    }

    let mut content = vec![0u8; content_len];
    reader
        .read_exact(&mut content)
        .await
        .map_err(|e| DriverError::Transport(format!("chunk content read failed: {}", e)))?;
    Ok((header, content))
}

struct PendingMessage {
    total_len: u64,
    n_chunks: u32,
    next_index: u32,
    buffer: Vec<u8>,
}

/// Reassembles messages from chunks, keyed by message id.
///
/// Chunks of different messages may interleave on a multiplexed stream;
/// chunks within one message must arrive in order.
#[derive(Default)]
pub struct ChunkAssembler {
    pending: HashMap<u64, PendingMessage>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk. Returns the completed `(message_id, payload)` once
    /// the declared total length is satisfied.
    pub fn push(
        &mut self,
        header: &ChunkHeader,
        content: Vec<u8>,
    ) -> DriverResult<Option<(u64, Vec<u8>)>> {
        let id = header.message_id;
        if header.is_first() {
            if self.pending.contains_key(&id) {
                return Err(DriverError::Protocol(format!(
                    "duplicate first chunk for message {}",
                    id
                )));
            }
            let n_chunks = header.chunk_count().unwrap_or(1);
            if n_chunks <= 1 {
                return Ok(Some((id, content)));
            }
            let total_len = header.message_length.ok_or_else(|| {
                DriverError::Protocol(format!(
                    "first chunk of multi-chunk message {} lacks a total length",
                    id
                ))
            })?;
            self.pending.insert(
                id,
                PendingMessage {
                    total_len,
                    n_chunks,
                    next_index: 1,
                    buffer: content,
                },
            );
            return Ok(None);
        }

        let entry = self
            .pending
            .get_mut(&id)
            .ok_or_else(|| DriverError::Protocol(format!("chunk for unknown message {}", id)))?;
        if header.chunk_index() != entry.next_index {
            return Err(DriverError::Protocol(format!(
                "message {}: expected chunk {}, got {}",
                id,
                entry.next_index,
                header.chunk_index()
            )));
        }
        entry.next_index += 1;
        entry.buffer.extend_from_slice(&content);

        if (entry.buffer.len() as u64) < entry.total_len {
            return Ok(None);
        }
        let done = self.pending.remove(&id).unwrap();
        if done.buffer.len() as u64 != done.total_len {
            return Err(DriverError::Protocol(format!(
                "message {}: received {} bytes, {} declared",
                id,
                done.buffer.len(),
                done.total_len
            )));
        }
        if done.next_index != done.n_chunks {
            return Err(DriverError::Protocol(format!(
                "message {}: received {} chunks, {} declared",
                id, done.next_index, done.n_chunks
            )));
        }
        Ok(Some((id, done.buffer)))
    }
}
