//! Definitions and implementations of data messages.
use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use super::ParseError;
use super::header::DataMessageType;

pub mod alert;
pub mod battery_status;
pub mod bist;
pub mod request;
pub mod revision;
pub mod sink_capabilities;
pub mod source_capabilities;
pub mod vendor_defined;

/// Contents of data messages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Data {
    /// Source capabilities.
    SourceCapabilities(source_capabilities::SourceCapabilities),
    /// Request for a power level from the source.
    ///
    /// Kept raw, since its layout depends on the PDO that it refers to.
    Request(request::RawRequest),
    /// Built-in self test request.
    Bist(bist::BistDataObject),
    /// Sink capabilities.
    SinkCapabilities(sink_capabilities::SinkCapabilities),
    /// Battery status.
    BatteryStatus(battery_status::BatteryStatusDataObject),
    /// Alert.
    Alert(alert::AlertDataObject),
    /// Revision of the sender.
    Revision(revision::RevisionDataObject),
    /// Vendor defined message.
    VendorDefined(vendor_defined::VendorDefined),
    /// A data message that is not interpreted, with its raw type and objects.
    Unknown(DataMessageType, Vec<u32, 7>),
}

impl Data {
    /// The message type of this payload.
    pub fn message_type(&self) -> DataMessageType {
        match self {
            Self::SourceCapabilities(_) => DataMessageType::SourceCapabilities,
            Self::Request(_) => DataMessageType::Request,
            Self::Bist(_) => DataMessageType::Bist,
            Self::SinkCapabilities(_) => DataMessageType::SinkCapabilities,
            Self::BatteryStatus(_) => DataMessageType::BatteryStatus,
            Self::Alert(_) => DataMessageType::Alert,
            Self::Revision(_) => DataMessageType::Revision,
            Self::VendorDefined(_) => DataMessageType::VendorDefined,
            Self::Unknown(message_type, _) => *message_type,
        }
    }

    /// The number of data objects that the payload occupies.
    pub fn num_objects(&self) -> u8 {
        match self {
            Self::SourceCapabilities(caps) => caps.pdos().len() as u8,
            Self::SinkCapabilities(caps) => caps.num_objects(),
            Self::VendorDefined(vdm) => vdm.num_objects(),
            Self::Unknown(_, objects) => objects.len() as u8,
            Self::Request(_) | Self::Bist(_) | Self::BatteryStatus(_) | Self::Alert(_) | Self::Revision(_) => 1,
        }
    }

    /// Parse the data objects of a data message.
    pub fn parse(message_type: DataMessageType, payload: &[u8]) -> Result<Self, ParseError> {
        let objects: Vec<u32, 7> = payload.chunks_exact(4).take(7).map(LittleEndian::read_u32).collect();

        let Some(&first) = objects.first() else {
            return Err(ParseError::InvalidLength {
                expected: 4,
                found: payload.len(),
            });
        };

        Ok(match message_type {
            DataMessageType::SourceCapabilities => Self::SourceCapabilities(
                source_capabilities::SourceCapabilities(objects.iter().copied().map(Into::into).collect()),
            ),
            DataMessageType::Request => Self::Request(request::RawRequest(first)),
            DataMessageType::Bist => Self::Bist(bist::BistDataObject(first)),
            DataMessageType::SinkCapabilities => Self::SinkCapabilities(sink_capabilities::SinkCapabilities(
                objects.iter().copied().map(Into::into).collect(),
            )),
            DataMessageType::BatteryStatus => Self::BatteryStatus(battery_status::BatteryStatusDataObject(first)),
            DataMessageType::Alert => Self::Alert(alert::AlertDataObject(first)),
            DataMessageType::Revision => Self::Revision(revision::RevisionDataObject(first)),
            DataMessageType::VendorDefined => {
                Self::VendorDefined(vendor_defined::VendorDefined::from_objects(first, &objects[1..]))
            }
            _ => {
                trace!("Uninterpreted data message {:?}", message_type);
                Self::Unknown(message_type, objects)
            }
        })
    }

    /// Serialize message data to a slice, returning the number of written bytes.
    pub fn to_bytes(&self, payload: &mut [u8]) -> usize {
        let mut write = |objects: &mut dyn Iterator<Item = u32>| {
            let mut written = 0;
            for object in objects {
                LittleEndian::write_u32(&mut payload[written..], object);
                written += 4;
            }
            written
        };

        match self {
            Self::SourceCapabilities(caps) => write(&mut caps.pdos().iter().map(|pdo| pdo.to_raw())),
            Self::SinkCapabilities(caps) => write(&mut caps.pdos().iter().map(|pdo| pdo.to_raw())),
            Self::Request(rdo) => write(&mut core::iter::once(rdo.0)),
            Self::Bist(bdo) => write(&mut core::iter::once(bdo.0)),
            Self::BatteryStatus(bsdo) => write(&mut core::iter::once(bsdo.0)),
            Self::Alert(ado) => write(&mut core::iter::once(ado.0)),
            Self::Revision(rmdo) => write(&mut core::iter::once(rmdo.0)),
            Self::VendorDefined(vdm) => write(&mut vdm.objects()),
            Self::Unknown(_, objects) => write(&mut objects.iter().copied()),
        }
    }
}
