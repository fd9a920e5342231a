//! Chunked extended messages.
//!
//! Extended payloads of up to 260 bytes are split into chunks of up to 26 bytes.
//! Each chunk after the first is sent after the receiver requested it.
use heapless::Vec;

use super::ExtendedHeader;
use crate::protocol_layer::message::ParseError;
use crate::protocol_layer::message::header::{ExtendedMessageType, Header};

/// Maximum data bytes in a single extended message chunk.
pub const MAX_EXTENDED_MSG_CHUNK_LEN: usize = 26;

/// Maximum total extended message length (data only, excluding headers).
pub const MAX_EXTENDED_MSG_LEN: usize = 260;

/// Maximum length of a framed chunk: header, extended header and a full chunk.
pub const MAX_CHUNK_FRAME_LEN: usize = 2 + 2 + MAX_EXTENDED_MSG_CHUNK_LEN;

/// Result of processing a received chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkResult {
    /// All chunks were received. Holds the reassembled payload.
    Complete(Vec<u8, MAX_EXTENDED_MSG_LEN>),
    /// More data is pending. Holds the number of the chunk to request next.
    NeedMoreChunks(u8),
}

/// Reassembles chunked extended messages.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkedMessageAssembler {
    buffer: Vec<u8, MAX_EXTENDED_MSG_LEN>,
    expected_size: u16,
    message_type: Option<ExtendedMessageType>,
    next_chunk: u8,
}

impl ChunkedMessageAssembler {
    /// Create a new, idle assembler.
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            expected_size: 0,
            message_type: None,
            next_chunk: 0,
        }
    }

    /// Drop a partially assembled message.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether a message is partially assembled.
    pub fn is_in_progress(&self) -> bool {
        self.message_type.is_some()
    }

    /// The type of the message that is being assembled.
    pub fn message_type(&self) -> Option<ExtendedMessageType> {
        self.message_type
    }

    /// Process a received chunk.
    ///
    /// `chunk_data` is the frame content after the extended header, which may carry padding.
    pub fn process_chunk(
        &mut self,
        header: Header,
        extended_header: ExtendedHeader,
        chunk_data: &[u8],
    ) -> Result<ChunkResult, ParseError> {
        let chunk_number = extended_header.chunk_number();

        if extended_header.request_chunk() {
            return Err(ParseError::Other("chunk request carries no data"));
        }

        if chunk_data.len() > MAX_EXTENDED_MSG_CHUNK_LEN {
            return Err(ParseError::ChunkOverflow(chunk_data.len(), MAX_EXTENDED_MSG_CHUNK_LEN));
        }

        if chunk_number == 0 {
            if self.is_in_progress() {
                return Err(ParseError::ParserReuse);
            }

            let size = extended_header.data_size() as usize;
            if size > MAX_EXTENDED_MSG_LEN {
                return Err(ParseError::ChunkOverflow(size, MAX_EXTENDED_MSG_LEN));
            }

            self.expected_size = extended_header.data_size();
            self.message_type = Some(header.message_type_raw().into());
            self.next_chunk = 0;
        } else if !self.is_in_progress() || chunk_number != self.next_chunk {
            return Err(ParseError::UnexpectedChunk {
                expected: self.next_chunk,
                found: chunk_number,
            });
        }

        let remaining = self.expected_size as usize - self.buffer.len();
        let take = remaining.min(chunk_data.len());
        self.buffer
            .extend_from_slice(&chunk_data[..take])
            .map_err(|_| ParseError::ChunkOverflow(self.buffer.len() + take, MAX_EXTENDED_MSG_LEN))?;

        if self.buffer.len() >= self.expected_size as usize {
            let payload = core::mem::take(&mut self.buffer);
            self.reset();
            Ok(ChunkResult::Complete(payload))
        } else {
            self.next_chunk += 1;
            Ok(ChunkResult::NeedMoreChunks(self.next_chunk))
        }
    }
}

/// Frames the chunks of an extended payload.
pub struct ChunkedMessageSender<'a> {
    data: &'a [u8],
}

impl<'a> ChunkedMessageSender<'a> {
    /// Create a new sender for a complete extended payload.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The number of chunks that the payload is split into.
    pub fn total_chunks(&self) -> u8 {
        self.data.len().div_ceil(MAX_EXTENDED_MSG_CHUNK_LEN).max(1) as u8
    }

    /// The total payload size.
    pub fn data_size(&self) -> u16 {
        self.data.len() as u16
    }

    /// The extended header and data of a chunk.
    pub fn chunk(&self, chunk_number: u8) -> Option<(ExtendedHeader, &'a [u8])> {
        if chunk_number >= self.total_chunks() {
            return None;
        }

        let start = chunk_number as usize * MAX_EXTENDED_MSG_CHUNK_LEN;
        let end = (start + MAX_EXTENDED_MSG_CHUNK_LEN).min(self.data.len());

        let extended_header = ExtendedHeader::new(self.data_size())
            .with_chunked(true)
            .with_chunk_number(chunk_number);

        Some((extended_header, &self.data[start..end]))
    }

    /// Write a chunk as a complete frame, padded to whole data objects.
    ///
    /// The object count of `header` is replaced. Returns the frame length, or zero if the chunk does not exist.
    pub fn frame_chunk(&self, header: Header, chunk_number: u8, buf: &mut [u8]) -> usize {
        let Some((extended_header, chunk)) = self.chunk(chunk_number) else {
            return 0;
        };

        let num_objects = (2 + chunk.len()).div_ceil(4);
        let len = 2 + 4 * num_objects;

        buf[..len].fill(0);
        header.with_num_objects(num_objects as u8).to_bytes(buf);
        extended_header.to_bytes(&mut buf[2..]);
        buf[4..4 + chunk.len()].copy_from_slice(chunk);

        len
    }
}

/// Write a request for a chunk as a complete frame, returning its length.
pub fn frame_chunk_request(header: Header, chunk_number: u8, buf: &mut [u8]) -> usize {
    buf[..6].fill(0);
    header.with_num_objects(1).to_bytes(buf);
    ExtendedHeader::new_chunk_request(chunk_number).to_bytes(&mut buf[2..]);
    6
}
