//! Definitions for a USB PD message header.
use byteorder::{ByteOrder, LittleEndian};
use proc_bitfield::bitfield;

use crate::protocol_layer::message::ParseError;
use crate::{DataRole, PowerRole, SpecificationRevision};

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    /// The 16 bit header that starts every message.
    pub struct Header(pub u16): Debug, FromStorage, IntoStorage {
        /// Set for extended messages.
        pub extended: bool @ 15,
        /// The number of 32 bit data objects that follow the header.
        pub num_objects: u8 [get usize] @ 12..=14,
        /// A rolling counter, maintained per SOP by the originator of the message.
        pub message_id: u8 @ 9..=11,
        /// The port's present power role. On SOP'/SOP'' this is the cable plug flag.
        pub port_power_role: bool [get PowerRole, set PowerRole] @ 8,
        /// The specification revision, where `0b11` is reserved.
        pub spec_revision: u8 [try_get SpecificationRevision, set SpecificationRevision] @ 6..=7,
        /// The port's data role. Reserved on SOP'/SOP''.
        pub port_data_role: bool [get DataRole, set DataRole] @ 5,
        /// The raw type of the message, to be interpreted together with `extended` and `num_objects`.
        pub message_type_raw: u8 @ 0..=4,
    }
}

impl Header {
    /// Create a header template with the given attributes.
    pub fn new_template(
        port_data_role: DataRole,
        port_power_role: PowerRole,
        spec_revision: SpecificationRevision,
    ) -> Self {
        Self(0)
            .with_port_data_role(port_data_role)
            .with_port_power_role(port_power_role)
            .with_spec_revision(spec_revision)
    }

    /// Create a new header that follows a template.
    pub fn new(template: Self, message_id: u8, message_type: MessageType, num_objects: u8) -> Self {
        let (raw_type, extended) = match message_type {
            MessageType::Control(x) => (u8::from(x), false),
            MessageType::Data(x) => (u8::from(x), false),
            MessageType::Extended(x) => (u8::from(x), true),
        };

        template
            .with_message_id(message_id & 0b111)
            .with_message_type_raw(raw_type)
            .with_num_objects(num_objects)
            .with_extended(extended)
    }

    /// Create a new control message header.
    pub fn new_control(template: Self, message_id: u8, message_type: ControlMessageType) -> Self {
        Self::new(template, message_id, MessageType::Control(message_type), 0)
    }

    /// Create a new data message header.
    pub fn new_data(template: Self, message_id: u8, message_type: DataMessageType, num_objects: u8) -> Self {
        Self::new(template, message_id, MessageType::Data(message_type), num_objects)
    }

    /// Create a new extended message header.
    pub fn new_extended(template: Self, message_id: u8, message_type: ExtendedMessageType, num_objects: u8) -> Self {
        Self::new(template, message_id, MessageType::Extended(message_type), num_objects)
    }

    /// Parse a header from its binary representation.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < 2 {
            return Err(ParseError::InvalidLength {
                expected: 2,
                found: buf.len(),
            });
        }

        let header = Header(LittleEndian::read_u16(buf));
        header.spec_revision()?;
        Ok(header)
    }

    /// Serialize the header to its binary representation.
    pub fn to_bytes(self, buf: &mut [u8]) -> usize {
        LittleEndian::write_u16(buf, self.0);
        2
    }

    /// The revision of the header, with reserved values read as 3.x.
    pub fn revision(&self) -> SpecificationRevision {
        self.spec_revision().unwrap_or(SpecificationRevision::R3_X)
    }

    /// Extract the message type that the header encodes.
    pub fn message_type(&self) -> MessageType {
        if self.extended() {
            MessageType::Extended(self.message_type_raw().into())
        } else if self.num_objects() == 0 {
            MessageType::Control(self.message_type_raw().into())
        } else {
            MessageType::Data(self.message_type_raw().into())
        }
    }

    /// Whether this is the given control message.
    pub fn is_control(&self, message_type: ControlMessageType) -> bool {
        self.message_type() == MessageType::Control(message_type)
    }
}

/// The type of message that a header encodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    /// A control message, without data objects.
    Control(ControlMessageType),
    /// A data message, with one to seven data objects.
    Data(DataMessageType),
    /// An extended message, with an extended header and a payload of up to 260 bytes.
    Extended(ExtendedMessageType),
}

/// Declares a message type enum with its raw encoding.
///
/// Raw values without a name are kept in `Reserved`, so that they can be answered with Not_Supported.
macro_rules! message_types {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal,)* }) => {
        $(#[$meta])*
        #[allow(missing_docs)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum $name {
            $($variant,)*
            Reserved(u8),
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                match value {
                    $($value => Self::$variant,)*
                    x => Self::Reserved(x),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                match value {
                    $($name::$variant => $value,)*
                    $name::Reserved(x) => x,
                }
            }
        }
    };
}

message_types! {
    /// Types of control messages.
    ControlMessageType {
        GoodCRC = 0x01,
        GotoMin = 0x02,
        Accept = 0x03,
        Reject = 0x04,
        Ping = 0x05,
        PsRdy = 0x06,
        GetSourceCap = 0x07,
        GetSinkCap = 0x08,
        DrSwap = 0x09,
        PrSwap = 0x0A,
        VconnSwap = 0x0B,
        Wait = 0x0C,
        SoftReset = 0x0D,
        DataReset = 0x0E,
        DataResetComplete = 0x0F,
        NotSupported = 0x10,
        GetSourceCapExtended = 0x11,
        GetStatus = 0x12,
        FrSwap = 0x13,
        GetPpsStatus = 0x14,
        GetCountryCodes = 0x15,
        GetSinkCapExtended = 0x16,
        GetSourceInfo = 0x17,
        GetRevision = 0x18,
    }
}

message_types! {
    /// Types of data messages.
    DataMessageType {
        SourceCapabilities = 0x01,
        Request = 0x02,
        Bist = 0x03,
        SinkCapabilities = 0x04,
        BatteryStatus = 0x05,
        Alert = 0x06,
        GetCountryInfo = 0x07,
        EnterUsb = 0x08,
        EprRequest = 0x09,
        EprMode = 0x0A,
        SourceInfo = 0x0B,
        Revision = 0x0C,
        VendorDefined = 0x0F,
    }
}

message_types! {
    /// Types of extended messages.
    ExtendedMessageType {
        SourceCapabilitiesExtended = 0x01,
        Status = 0x02,
        GetBatteryCap = 0x03,
        GetBatteryStatus = 0x04,
        BatteryCapabilities = 0x05,
        GetManufacturerInfo = 0x06,
        ManufacturerInfo = 0x07,
        SecurityRequest = 0x08,
        SecurityResponse = 0x09,
        FirmwareUpdateRequest = 0x0A,
        FirmwareUpdateResponse = 0x0B,
        PpsStatus = 0x0C,
        CountryInfo = 0x0D,
        CountryCodes = 0x0E,
        SinkCapabilitiesExtended = 0x0F,
        ExtendedControl = 0x10,
        EprSourceCapabilities = 0x11,
        EprSinkCapabilities = 0x12,
        VendorDefinedExtended = 0x1E,
    }
}
