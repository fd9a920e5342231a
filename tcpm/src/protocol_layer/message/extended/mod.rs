//! Definitions and implementations of extended messages.
//!
//! Extended payloads are serialized as plain byte strings. Splitting them into chunks is done by
//! [`chunked`].
pub mod chunked;

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;
use proc_bitfield::bitfield;

use super::ParseError;
use super::header::ExtendedMessageType;
use chunked::MAX_EXTENDED_MSG_LEN;

bitfield! {
    /// Extended message header.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ExtendedHeader(pub u16): Debug, FromStorage, IntoStorage {
        /// Payload size in bytes, of the complete message.
        pub data_size: u16 @ 0..=8,
        /// Request chunk flag.
        pub request_chunk: bool @ 10,
        /// Chunk number of this extended message.
        pub chunk_number: u8 @ 11..=14,
        /// Whether the message is chunked.
        pub chunked: bool @ 15,
    }
}

impl ExtendedHeader {
    /// Create a new, unchunked extended header for a given payload size.
    pub fn new(data_size: u16) -> Self {
        Self(0).with_data_size(data_size)
    }

    /// Create the extended header of a chunk request.
    pub fn new_chunk_request(chunk_number: u8) -> Self {
        Self(0)
            .with_chunked(true)
            .with_request_chunk(true)
            .with_chunk_number(chunk_number)
    }

    /// Serialize the extended header into the buffer, returning bytes written.
    pub fn to_bytes(self, buf: &mut [u8]) -> usize {
        LittleEndian::write_u16(buf, self.0);
        2
    }

    /// Parse an extended header from bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < 2 {
            return Err(ParseError::InvalidLength {
                expected: 2,
                found: buf.len(),
            });
        }

        Ok(Self(LittleEndian::read_u16(buf)))
    }
}

/// Source_Capabilities_Extended data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceCapabilitiesExtended(pub [u8; 25]);

impl SourceCapabilitiesExtended {
    /// Create a data block with identification and the source's PDP in watts.
    pub fn new(vid: u16, pid: u16, xid: u32, source_pdp_watts: u8) -> Self {
        let mut raw = [0u8; 25];
        LittleEndian::write_u16(&mut raw[0..], vid);
        LittleEndian::write_u16(&mut raw[2..], pid);
        LittleEndian::write_u32(&mut raw[4..], xid);
        raw[24] = source_pdp_watts;
        Self(raw)
    }

    /// USB vendor ID.
    pub fn vid(&self) -> u16 {
        LittleEndian::read_u16(&self.0[0..])
    }

    /// USB product ID.
    pub fn pid(&self) -> u16 {
        LittleEndian::read_u16(&self.0[2..])
    }

    /// Source power delivery power in watts.
    pub fn source_pdp(&self) -> u8 {
        self.0[24]
    }
}

/// Status data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    /// Internal temperature in °C, zero when not supported.
    pub internal_temperature: u8,
    /// Present input flags.
    pub present_input: u8,
    /// Present battery input flags.
    pub present_battery_input: u8,
    /// Event flags (OCP, OTP, OVP, CF mode).
    pub event_flags: u8,
    /// Temperature status.
    pub temperature_status: u8,
    /// Power status.
    pub power_status: u8,
    /// Power state change.
    pub power_state_change: u8,
}

impl Status {
    const SIZE: usize = 7;

    fn to_bytes(self, buf: &mut [u8]) -> usize {
        buf[..Self::SIZE].copy_from_slice(&[
            self.internal_temperature,
            self.present_input,
            self.present_battery_input,
            self.event_flags,
            self.temperature_status,
            self.power_status,
            self.power_state_change,
        ]);
        Self::SIZE
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let byte = |i: usize| buf.get(i).copied().unwrap_or_default();
        Self {
            internal_temperature: byte(0),
            present_input: byte(1),
            present_battery_input: byte(2),
            event_flags: byte(3),
            temperature_status: byte(4),
            power_status: byte(5),
            power_state_change: byte(6),
        }
    }
}

/// Battery capabilities data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryCapabilities {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Design capacity in 0.1 Wh units.
    pub design_capacity: u16,
    /// Last full charge capacity in 0.1 Wh units.
    pub last_full_charge_capacity: u16,
    /// Battery type, where bit 0 marks an invalid battery reference.
    pub battery_type: u8,
}

impl BatteryCapabilities {
    const SIZE: usize = 9;

    /// The answer for a battery reference that does not exist.
    pub fn invalid_reference() -> Self {
        Self {
            vid: 0xFFFF,
            pid: 0,
            design_capacity: 0,
            last_full_charge_capacity: 0,
            battery_type: 1,
        }
    }

    fn to_bytes(self, buf: &mut [u8]) -> usize {
        LittleEndian::write_u16(&mut buf[0..], self.vid);
        LittleEndian::write_u16(&mut buf[2..], self.pid);
        LittleEndian::write_u16(&mut buf[4..], self.design_capacity);
        LittleEndian::write_u16(&mut buf[6..], self.last_full_charge_capacity);
        buf[8] = self.battery_type;
        Self::SIZE
    }

    fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            vid: LittleEndian::read_u16(&buf[0..]),
            pid: LittleEndian::read_u16(&buf[2..]),
            design_capacity: LittleEndian::read_u16(&buf[4..]),
            last_full_charge_capacity: LittleEndian::read_u16(&buf[6..]),
            battery_type: buf[8],
        })
    }
}

/// Manufacturer info data block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManufacturerInfo {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Manufacturer string, without terminator.
    pub string: Vec<u8, 22>,
}

impl ManufacturerInfo {
    /// The answer for a target or reference that does not exist.
    pub fn not_supported() -> Self {
        let mut string = Vec::new();
        string.extend_from_slice(b"Not Supported").ok();
        Self { vid: 0, pid: 0, string }
    }

    fn to_bytes(&self, buf: &mut [u8]) -> usize {
        LittleEndian::write_u16(&mut buf[0..], self.vid);
        LittleEndian::write_u16(&mut buf[2..], self.pid);
        buf[4..4 + self.string.len()].copy_from_slice(&self.string);
        4 + self.string.len()
    }
}

/// Country codes, two ASCII characters each.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountryCodes(pub Vec<[u8; 2], 64>);

impl CountryCodes {
    fn to_bytes(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.0.len() as u8;
        buf[1] = 0;

        for (index, code) in self.0.iter().enumerate() {
            buf[2 + 2 * index..4 + 2 * index].copy_from_slice(code);
        }

        2 + 2 * self.0.len()
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let count = buf.first().copied().unwrap_or_default() as usize;

        Self(
            buf.get(2..)
                .unwrap_or_default()
                .chunks_exact(2)
                .take(count.min(64))
                .map(|code| [code[0], code[1]])
                .collect(),
        )
    }
}

/// Types of extended messages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Extended {
    /// Extended source capabilities.
    SourceCapabilitiesExtended(SourceCapabilitiesExtended),
    /// Port status.
    Status(Status),
    /// Request for the capabilities of a battery, by reference.
    GetBatteryCap(u8),
    /// Request for the status of a battery, by reference.
    GetBatteryStatus(u8),
    /// Battery capabilities.
    BatteryCapabilities(BatteryCapabilities),
    /// Request for manufacturer info of the port (target 0) or a battery (target 1).
    GetManufacturerInfo {
        /// Port or battery.
        target: u8,
        /// Battery reference.
        reference: u8,
    },
    /// Manufacturer info.
    ManufacturerInfo(ManufacturerInfo),
    /// Country codes.
    CountryCodes(CountryCodes),
    /// A message type that is not interpreted, with its raw type and payload.
    Unknown(ExtendedMessageType, Vec<u8, MAX_EXTENDED_MSG_LEN>),
}

impl Extended {
    /// The message type of this payload.
    pub fn message_type(&self) -> ExtendedMessageType {
        match self {
            Self::SourceCapabilitiesExtended(_) => ExtendedMessageType::SourceCapabilitiesExtended,
            Self::Status(_) => ExtendedMessageType::Status,
            Self::GetBatteryCap(_) => ExtendedMessageType::GetBatteryCap,
            Self::GetBatteryStatus(_) => ExtendedMessageType::GetBatteryStatus,
            Self::BatteryCapabilities(_) => ExtendedMessageType::BatteryCapabilities,
            Self::GetManufacturerInfo { .. } => ExtendedMessageType::GetManufacturerInfo,
            Self::ManufacturerInfo(_) => ExtendedMessageType::ManufacturerInfo,
            Self::CountryCodes(_) => ExtendedMessageType::CountryCodes,
            Self::Unknown(message_type, _) => *message_type,
        }
    }

    /// Serialize the payload to a slice of at least 260 bytes, returning the number of written bytes.
    pub fn to_bytes(&self, payload: &mut [u8]) -> usize {
        match self {
            Self::SourceCapabilitiesExtended(data) => {
                payload[..data.0.len()].copy_from_slice(&data.0);
                data.0.len()
            }
            Self::Status(status) => status.to_bytes(payload),
            Self::GetBatteryCap(reference) | Self::GetBatteryStatus(reference) => {
                payload[0] = *reference;
                1
            }
            Self::BatteryCapabilities(caps) => caps.to_bytes(payload),
            Self::GetManufacturerInfo { target, reference } => {
                payload[0] = *target;
                payload[1] = *reference;
                2
            }
            Self::ManufacturerInfo(info) => info.to_bytes(payload),
            Self::CountryCodes(codes) => codes.to_bytes(payload),
            Self::Unknown(_, data) => {
                payload[..data.len()].copy_from_slice(data);
                data.len()
            }
        }
    }

    /// Parse a complete (reassembled) extended payload.
    ///
    /// Payloads that are too short to interpret are kept as [`Extended::Unknown`].
    pub fn parse(message_type: ExtendedMessageType, payload: &[u8]) -> Self {
        let parsed = match message_type {
            ExtendedMessageType::SourceCapabilitiesExtended => payload
                .get(..25)
                .and_then(|raw| <[u8; 25]>::try_from(raw).ok())
                .map(|raw| Self::SourceCapabilitiesExtended(SourceCapabilitiesExtended(raw))),
            ExtendedMessageType::Status => Some(Self::Status(Status::from_bytes(payload))),
            ExtendedMessageType::GetBatteryCap => payload.first().map(|r| Self::GetBatteryCap(*r)),
            ExtendedMessageType::GetBatteryStatus => payload.first().map(|r| Self::GetBatteryStatus(*r)),
            ExtendedMessageType::BatteryCapabilities => {
                BatteryCapabilities::from_bytes(payload).map(Self::BatteryCapabilities)
            }
            ExtendedMessageType::GetManufacturerInfo => match payload {
                [target, reference, ..] => Some(Self::GetManufacturerInfo {
                    target: *target,
                    reference: *reference,
                }),
                _ => None,
            },
            ExtendedMessageType::ManufacturerInfo if payload.len() >= 4 => {
                let mut string = Vec::new();
                let text = &payload[4..];
                string.extend_from_slice(&text[..text.len().min(22)]).ok();
                Some(Self::ManufacturerInfo(ManufacturerInfo {
                    vid: LittleEndian::read_u16(&payload[0..]),
                    pid: LittleEndian::read_u16(&payload[2..]),
                    string,
                }))
            }
            ExtendedMessageType::CountryCodes => Some(Self::CountryCodes(CountryCodes::from_bytes(payload))),
            _ => None,
        };

        parsed.unwrap_or_else(|| {
            let mut data = Vec::new();
            data.extend_from_slice(&payload[..payload.len().min(MAX_EXTENDED_MSG_LEN)])
                .ok();
            Self::Unknown(message_type, data)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_codes_span_multiple_chunks() {
        let codes = CountryCodes(
            [
                *b"DE", *b"US", *b"JP", *b"FR", *b"CN", *b"KR", *b"GB", *b"IT", *b"ES", *b"NL", *b"SE", *b"CH", *b"AT",
                *b"BE",
            ]
            .into_iter()
            .collect(),
        );
        let extended = Extended::CountryCodes(codes.clone());

        let mut buf = [0u8; MAX_EXTENDED_MSG_LEN];
        let len = extended.to_bytes(&mut buf);
        assert_eq!(len, 30);
        assert!(len > chunked::MAX_EXTENDED_MSG_CHUNK_LEN);

        assert_eq!(
            Extended::parse(ExtendedMessageType::CountryCodes, &buf[..len]),
            Extended::CountryCodes(codes)
        );
    }

    #[test]
    fn test_short_payload_is_unknown() {
        let parsed = Extended::parse(ExtendedMessageType::BatteryCapabilities, &[1, 2, 3]);
        assert!(matches!(
            parsed,
            Extended::Unknown(ExtendedMessageType::BatteryCapabilities, ref data) if data.len() == 3
        ));
    }

    #[test]
    fn test_chunk_request_header() {
        let header = ExtendedHeader::new_chunk_request(3);
        assert!(header.chunked());
        assert!(header.request_chunk());
        assert_eq!(header.chunk_number(), 3);
        assert_eq!(header.data_size(), 0);
    }
}
