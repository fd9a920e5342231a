//! Revision message data objects (RMDO).
use proc_bitfield::bitfield;

bitfield! {
    /// A revision message data object.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RevisionDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// Revision, major
        pub revision_major: u8 @ 28..=31,
        /// Revision, minor
        pub revision_minor: u8 @ 24..=27,
        /// Version, major
        pub version_major: u8 @ 20..=23,
        /// Version, minor
        pub version_minor: u8 @ 16..=19,
    }
}

impl RevisionDataObject {
    /// Revision 3.1, version 1.8.
    pub const R3_1_V1_8: Self = Self(0x3118_0000);
}
