//! Definitions of message content.
pub mod data;
pub mod extended;
pub mod header;

use data::Data;
use extended::{Extended, ExtendedHeader};
use header::{Header, MessageType};
use tcpm_traits::UnsupportedRevision;

/// Errors that can occur during message/header parsing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// The input buffer has an invalid length.
    #[error("invalid input buffer length (expected {expected:?}, found {found:?})")]
    InvalidLength {
        /// The expected length.
        expected: usize,
        /// The actual length found.
        found: usize,
    },
    /// The specification revision field is reserved.
    #[error("unsupported specification revision `{0}`")]
    UnsupportedSpecificationRevision(u8),
    /// A chunk carried more than the maximum chunk payload.
    #[error("chunk of {0} bytes exceeds the maximum of {1} bytes")]
    ChunkOverflow(usize, usize),
    /// A first chunk arrived while another message was being assembled.
    #[error("chunked message assembler is already in use")]
    ParserReuse,
    /// A chunk arrived out of order.
    #[error("unexpected chunk number (expected {expected:?}, found {found:?})")]
    UnexpectedChunk {
        /// The chunk number that was expected next.
        expected: u8,
        /// The chunk number that was received.
        found: u8,
    },
    /// The extended message is a chunk request, or needs further chunks.
    #[error("extended message is incomplete")]
    IncompleteChunkedMessage,
    /// Other parsing error with a message.
    #[error("other parse error: {0}")]
    Other(&'static str),
}

impl From<UnsupportedRevision> for ParseError {
    fn from(value: UnsupportedRevision) -> Self {
        Self::UnsupportedSpecificationRevision(value.0)
    }
}

/// Payload of a USB PD message, if any.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// Payload for a data message.
    Data(Data),
    /// Payload for an extended message.
    Extended(Extended),
}

/// A USB PD message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// The message header.
    pub header: Header,
    /// Optional payload for data and extended messages.
    pub payload: Option<Payload>,
}

impl Message {
    /// Create a new message from a message header.
    pub fn new(header: Header) -> Self {
        Self { header, payload: None }
    }

    /// Create a new message from a message header and payload data.
    pub fn new_with_data(header: Header, data: Data) -> Self {
        Self {
            header,
            payload: Some(Payload::Data(data)),
        }
    }

    /// Create a new message from a message header and an extended payload.
    pub fn new_with_extended(header: Header, extended: Extended) -> Self {
        Self {
            header,
            payload: Some(Payload::Extended(extended)),
        }
    }

    /// The data payload, if this is a data message.
    pub fn data(&self) -> Option<&Data> {
        match self.payload.as_ref() {
            Some(Payload::Data(data)) => Some(data),
            _ => None,
        }
    }

    /// The extended payload, if this is a complete extended message.
    pub fn extended(&self) -> Option<&Extended> {
        match self.payload.as_ref() {
            Some(Payload::Extended(extended)) => Some(extended),
            _ => None,
        }
    }

    /// Serialize a message to a slice, returning the number of written bytes.
    ///
    /// Extended messages are written as their first chunk. Longer payloads are chunked by the protocol layer.
    pub fn to_bytes(&self, buffer: &mut [u8]) -> usize {
        match self.payload.as_ref() {
            Some(Payload::Data(data)) => self.header.to_bytes(buffer) + data.to_bytes(&mut buffer[2..]),
            Some(Payload::Extended(extended)) => {
                let mut payload = [0u8; extended::chunked::MAX_EXTENDED_MSG_LEN];
                let size = extended.to_bytes(&mut payload);
                let sender = extended::chunked::ChunkedMessageSender::new(&payload[..size]);
                sender.frame_chunk(self.header, 0, buffer)
            }
            None => self.header.to_bytes(buffer),
        }
    }

    /// Parse a message from a slice of bytes.
    ///
    /// Extended messages must be complete within this frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        let header = Header::from_bytes(data)?;
        let expected = 2 + 4 * header.num_objects();

        if data.len() < expected {
            return Err(ParseError::InvalidLength {
                expected,
                found: data.len(),
            });
        }

        let payload = &data[2..expected];

        match header.message_type() {
            MessageType::Control(_) => Ok(Self::new(header)),
            MessageType::Data(message_type) => Ok(Self::new_with_data(header, Data::parse(message_type, payload)?)),
            MessageType::Extended(message_type) => {
                let extended_header = ExtendedHeader::from_bytes(payload)?;
                let chunk = &payload[2..];
                let size = extended_header.data_size() as usize;

                if extended_header.request_chunk() || size > chunk.len() {
                    return Err(ParseError::IncompleteChunkedMessage);
                }

                Ok(Self::new_with_extended(
                    header,
                    Extended::parse(message_type, &chunk[..size]),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::data::source_capabilities::PowerDataObject;
    use super::header::{ControlMessageType, DataMessageType, ExtendedMessageType};
    use super::*;
    use crate::dummy::DUMMY_CAPABILITIES;
    use crate::{DataRole, PowerRole, SpecificationRevision};

    #[test]
    fn test_parse_source_capabilities() {
        let message = Message::from_bytes(&DUMMY_CAPABILITIES).unwrap();

        assert_eq!(
            message.header.message_type(),
            MessageType::Data(DataMessageType::SourceCapabilities)
        );

        let Some(Data::SourceCapabilities(caps)) = message.data() else {
            panic!("Expected source capabilities");
        };

        assert_eq!(caps.pdos().len(), 3);
        assert!(matches!(caps.pdos()[0], PowerDataObject::FixedSupply(_)));
        assert!(caps.validate().is_ok());
    }

    #[test]
    fn test_control_message_roundtrip() {
        let template = Header::new_template(DataRole::Ufp, PowerRole::Sink, SpecificationRevision::R2_0);
        let message = Message::new(Header::new_control(template, 5, ControlMessageType::GetSinkCap));

        let mut buf = [0u8; 2];
        assert_eq!(message.to_bytes(&mut buf), 2);

        let parsed = Message::from_bytes(&buf).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_truncated_data_message() {
        let truncated = &DUMMY_CAPABILITIES[..10];
        assert!(matches!(
            Message::from_bytes(truncated),
            Err(ParseError::InvalidLength { expected: 14, found: 10 })
        ));
    }

    #[test]
    fn test_single_chunk_extended_message() {
        let template = Header::new_template(DataRole::Dfp, PowerRole::Source, SpecificationRevision::R3_X);
        let header = Header::new_extended(template, 2, ExtendedMessageType::GetBatteryCap, 1);
        let message = Message::new_with_extended(header, Extended::GetBatteryCap(1));

        let mut buf = [0u8; 30];
        let len = message.to_bytes(&mut buf);
        assert_eq!(len, 6);

        let parsed = Message::from_bytes(&buf[..len]).unwrap();
        assert_eq!(parsed.extended(), Some(&Extended::GetBatteryCap(1)));
    }
}
