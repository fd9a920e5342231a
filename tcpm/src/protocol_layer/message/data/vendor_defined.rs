//! Vendor defined messages (VDMs).
//!
//! Only the discovery commands of structured VDMs are interpreted. Everything else is kept as raw
//! objects, so that it can be answered with NAK or Not_Supported.
use heapless::Vec;
use proc_bitfield::bitfield;

use crate::SpecificationRevision;

/// The standard ID that is used for PD discovery commands.
pub const PD_SID: u16 = 0xFF00;

/// Structured or unstructured VDM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdmType {
    /// Unstructured, vendor specific content.
    Unstructured,
    /// Structured, with a command in the header.
    Structured,
}

impl From<VdmType> for bool {
    fn from(value: VdmType) -> Self {
        match value {
            VdmType::Unstructured => false,
            VdmType::Structured => true,
        }
    }
}

impl From<bool> for VdmType {
    fn from(value: bool) -> Self {
        match value {
            true => VdmType::Structured,
            false => VdmType::Unstructured,
        }
    }
}

/// Command types of structured VDMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdmCommandType {
    /// A request from the initiator.
    InitiatorReq,
    /// Acknowledged by the responder.
    ResponderAck,
    /// Rejected by the responder.
    ResponderNak,
    /// The responder is busy.
    ResponderBusy,
}

impl From<VdmCommandType> for u8 {
    fn from(value: VdmCommandType) -> Self {
        match value {
            VdmCommandType::InitiatorReq => 0,
            VdmCommandType::ResponderAck => 1,
            VdmCommandType::ResponderNak => 2,
            VdmCommandType::ResponderBusy => 3,
        }
    }
}

impl From<u8> for VdmCommandType {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => VdmCommandType::InitiatorReq,
            1 => VdmCommandType::ResponderAck,
            2 => VdmCommandType::ResponderNak,
            _ => VdmCommandType::ResponderBusy,
        }
    }
}

/// Structured VDM commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VdmCommand {
    /// Discover Identity
    DiscoverIdentity,
    /// Discover SVIDs
    DiscoverSvids,
    /// Discover Modes
    DiscoverModes,
    /// Enter Mode
    EnterMode,
    /// Exit Mode
    ExitMode,
    /// Attention
    Attention,
    /// SVID specific or reserved commands.
    Other(u8),
}

impl From<VdmCommand> for u8 {
    fn from(value: VdmCommand) -> Self {
        match value {
            VdmCommand::DiscoverIdentity => 0x1,
            VdmCommand::DiscoverSvids => 0x2,
            VdmCommand::DiscoverModes => 0x3,
            VdmCommand::EnterMode => 0x4,
            VdmCommand::ExitMode => 0x5,
            VdmCommand::Attention => 0x6,
            VdmCommand::Other(x) => x,
        }
    }
}

impl From<u8> for VdmCommand {
    fn from(value: u8) -> Self {
        match value {
            0x01 => VdmCommand::DiscoverIdentity,
            0x02 => VdmCommand::DiscoverSvids,
            0x03 => VdmCommand::DiscoverModes,
            0x04 => VdmCommand::EnterMode,
            0x05 => VdmCommand::ExitMode,
            0x06 => VdmCommand::Attention,
            x => VdmCommand::Other(x),
        }
    }
}

bitfield! {
    /// The fields that structured and unstructured VDM headers share.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct VdmHeaderRaw(pub u32): Debug, FromStorage, IntoStorage {
        /// VDM Standard or Vendor ID
        pub standard_or_vid: u16 @ 16..=31,
        /// VDM Type (Unstructured/Structured)
        pub vdm_type: bool [VdmType] @ 15,
    }
}

bitfield! {
    /// Header of a structured VDM.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct VdmHeaderStructured(pub u32): Debug, FromStorage, IntoStorage {
        /// VDM Standard or Vendor ID
        pub standard_or_vid: u16 @ 16..=31,
        /// VDM Type (Unstructured/Structured)
        pub vdm_type: bool [VdmType] @ 15,
        /// Structured VDM version, major
        pub vdm_version_major: u8 @ 13..=14,
        /// Structured VDM version, minor
        pub vdm_version_minor: u8 @ 11..=12,
        /// Object Position
        pub object_position: u8 @ 8..=10,
        /// Command Type
        pub command_type: u8 [VdmCommandType] @ 6..=7,
        /// Command
        pub command: u8 [VdmCommand] @ 0..=4,
    }
}

impl VdmHeaderStructured {
    /// Create a structured VDM header, with the VDM version that belongs to a PD revision.
    pub fn new(
        svid: u16,
        command: VdmCommand,
        command_type: VdmCommandType,
        revision: SpecificationRevision,
    ) -> Self {
        let major = match revision {
            SpecificationRevision::R3_X => 0b01,
            _ => 0b00,
        };

        Self(0)
            .with_vdm_type(VdmType::Structured)
            .with_standard_or_vid(svid)
            .with_vdm_version_major(major)
            .with_command(command)
            .with_command_type(command_type)
    }

    /// The response header to this request, keeping SVID, command and object position.
    pub fn response(&self, command_type: VdmCommandType, revision: SpecificationRevision) -> Self {
        Self::new(self.standard_or_vid(), self.command(), command_type, revision)
            .with_object_position(self.object_position())
    }
}

bitfield! {
    /// Header of an unstructured VDM.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct VdmHeaderUnstructured(pub u32): Debug, FromStorage, IntoStorage {
        /// Vendor ID
        pub standard_or_vid: u16 @ 16..=31,
        /// VDM Type (Unstructured/Structured)
        pub vdm_type: bool [VdmType] @ 15,
        /// Vendor defined content
        pub data: u16 @ 0..=14
    }
}

/// A VDM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VdmHeader {
    /// Header of a structured VDM.
    Structured(VdmHeaderStructured),
    /// Header of an unstructured VDM.
    Unstructured(VdmHeaderUnstructured),
}

impl From<VdmHeader> for u32 {
    fn from(value: VdmHeader) -> Self {
        match value {
            VdmHeader::Structured(header) => header.into(),
            VdmHeader::Unstructured(header) => header.into(),
        }
    }
}

impl From<u32> for VdmHeader {
    fn from(value: u32) -> Self {
        match VdmHeaderRaw(value).vdm_type() {
            VdmType::Structured => VdmHeader::Structured(VdmHeaderStructured(value)),
            VdmType::Unstructured => VdmHeader::Unstructured(VdmHeaderUnstructured(value)),
        }
    }
}

bitfield! {
    /// ID header VDO, the first object of a Discover Identity response.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct IdHeader(pub u32): Debug, FromStorage, IntoStorage {
        /// Capable of USB host operation
        pub usb_host: bool @ 31,
        /// Capable of USB device operation
        pub usb_device: bool @ 30,
        /// Product type as UFP, e.g. 0b010 for a peripheral.
        pub product_type_ufp: u8 @ 27..=29,
        /// Modal operation supported
        pub modal_operation: bool @ 26,
        /// Product type as DFP, e.g. 0b011 for a power brick.
        pub product_type_dfp: u8 @ 23..=25,
        /// Connector type, 0b10 for a receptacle.
        pub connector_type: u8 @ 21..=22,
        /// USB vendor ID
        pub vid: u16 @ 0..=15,
    }
}

bitfield! {
    /// Product VDO.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ProductVdo(pub u32): Debug, FromStorage, IntoStorage {
        /// USB product ID
        pub pid: u16 @ 16..=31,
        /// Device release number
        pub bcd_device: u16 @ 0..=15,
    }
}

/// The identity that a port reports in answer to Discover Identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// ID header VDO.
    pub id_header: IdHeader,
    /// XID from the USB-IF certification (Cert Stat VDO).
    pub cert_stat: u32,
    /// Product VDO.
    pub product: ProductVdo,
    /// Product type VDOs, depending on the product types in the ID header.
    pub product_type_vdos: Vec<u32, 3>,
}

impl Identity {
    /// The data objects that follow the VDM header in a response.
    pub fn to_objects(&self) -> Vec<u32, 6> {
        let mut objects = Vec::new();
        objects.push(self.id_header.into()).ok();
        objects.push(self.cert_stat).ok();
        objects.push(self.product.into()).ok();
        objects.extend_from_slice(&self.product_type_vdos).ok();
        objects
    }

    /// Interpret the objects of a Discover Identity ACK.
    pub fn from_objects(objects: &[u32]) -> Option<Self> {
        let [id_header, cert_stat, product, rest @ ..] = objects else {
            return None;
        };

        let mut product_type_vdos = Vec::new();
        product_type_vdos.extend_from_slice(&rest[..rest.len().min(3)]).ok();

        Some(Self {
            id_header: IdHeader(*id_header),
            cert_stat: *cert_stat,
            product: ProductVdo(*product),
            product_type_vdos,
        })
    }
}

/// Pack SVIDs into the objects of a Discover SVIDs response, two per object.
///
/// A list that fits entirely is terminated with a zero SVID.
pub fn pack_svids(svids: &[u16]) -> Vec<u32, 6> {
    let mut objects = Vec::new();
    let mut svids = svids.iter().copied().chain(core::iter::once(0)).take(12);

    while let Some(high) = svids.next() {
        let low = svids.next().unwrap_or_default();
        if objects.push((u32::from(high) << 16) | u32::from(low)).is_err() {
            break;
        }
    }

    objects
}

/// Unpack the SVIDs of a Discover SVIDs response, up to the zero terminator.
pub fn unpack_svids(objects: &[u32]) -> Vec<u16, 12> {
    objects
        .iter()
        .flat_map(|object| [(object >> 16) as u16, *object as u16])
        .take_while(|svid| *svid != 0)
        .collect()
}

/// A vendor defined message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VendorDefined {
    /// The VDM header.
    pub header: VdmHeader,
    /// The VDOs that follow the header.
    pub objects: Vec<u32, 6>,
}

impl VendorDefined {
    /// Create a VDM from a header and VDOs, of which at most six are kept.
    pub fn new(header: VdmHeader, objects: &[u32]) -> Self {
        let mut vdos = Vec::new();
        vdos.extend_from_slice(&objects[..objects.len().min(6)]).ok();
        Self { header, objects: vdos }
    }

    /// Interpret the raw objects of a VDM.
    pub fn from_objects(header: u32, objects: &[u32]) -> Self {
        Self::new(header.into(), objects)
    }

    /// The structured header, if this is a structured VDM.
    pub fn structured(&self) -> Option<VdmHeaderStructured> {
        match self.header {
            VdmHeader::Structured(header) => Some(header),
            VdmHeader::Unstructured(_) => None,
        }
    }

    /// All objects, including the header.
    pub fn objects(&self) -> impl Iterator<Item = u32> + '_ {
        core::iter::once(u32::from(self.header)).chain(self.objects.iter().copied())
    }

    /// The number of objects, including the header.
    pub fn num_objects(&self) -> u8 {
        1 + self.objects.len() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_identity_request() {
        let header = VdmHeaderStructured::new(
            PD_SID,
            VdmCommand::DiscoverIdentity,
            VdmCommandType::InitiatorReq,
            SpecificationRevision::R3_X,
        );
        assert_eq!(header.0, 0xFF00_A001);

        let VdmHeader::Structured(parsed) = VdmHeader::from(0xFF00_A001) else {
            panic!("Expected a structured header");
        };
        assert_eq!(parsed.command(), VdmCommand::DiscoverIdentity);
        assert_eq!(parsed.command_type(), VdmCommandType::InitiatorReq);

        let nak = parsed.response(VdmCommandType::ResponderNak, SpecificationRevision::R2_0);
        assert_eq!(nak.command_type(), VdmCommandType::ResponderNak);
        assert_eq!(nak.vdm_version_major(), 0);
    }

    #[test]
    fn test_reserved_command_is_kept() {
        let header = VdmHeaderStructured(0xFF01_8090);
        assert_eq!(header.command(), VdmCommand::Other(0x10));
        assert_eq!(header.command_type(), VdmCommandType::ResponderNak);
    }

    #[test]
    fn test_svid_packing() {
        let objects = pack_svids(&[0xFF01, 0x8087, 0x18D1]);
        assert_eq!(&objects[..], &[0xFF01_8087, 0x18D1_0000]);
        assert_eq!(&unpack_svids(&objects)[..], &[0xFF01, 0x8087, 0x18D1]);

        let objects = pack_svids(&[0xFF01, 0x8087]);
        assert_eq!(&objects[..], &[0xFF01_8087, 0x0000_0000]);
    }

    #[test]
    fn test_identity_objects() {
        let identity = Identity {
            id_header: IdHeader(0).with_usb_device(true).with_vid(0x18D1),
            cert_stat: 0,
            product: ProductVdo(0).with_pid(0x5678),
            product_type_vdos: Vec::new(),
        };

        let objects = identity.to_objects();
        assert_eq!(objects.len(), 3);
        assert_eq!(Identity::from_objects(&objects), Some(identity));
        assert_eq!(Identity::from_objects(&objects[..2]), None);
    }
}
