//! Built-in self test (BIST) data objects.
use proc_bitfield::bitfield;

/// BIST modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BistMode {
    /// Transmit the BIST carrier mode 2 pattern for tBISTContMode.
    CarrierMode2,
    /// Ignore received messages, apart from GoodCRC, until a hard reset.
    TestData,
    /// Enter shared capacity test mode.
    SharedTestModeEntry,
    /// Exit shared capacity test mode.
    SharedTestModeExit,
    /// Reserved modes, which are ignored.
    Reserved(u8),
}

impl From<u8> for BistMode {
    fn from(value: u8) -> Self {
        match value {
            0b0101 => Self::CarrierMode2,
            0b1000 => Self::TestData,
            0b1001 => Self::SharedTestModeEntry,
            0b1010 => Self::SharedTestModeExit,
            x => Self::Reserved(x),
        }
    }
}

impl From<BistMode> for u8 {
    fn from(value: BistMode) -> Self {
        match value {
            BistMode::CarrierMode2 => 0b0101,
            BistMode::TestData => 0b1000,
            BistMode::SharedTestModeEntry => 0b1001,
            BistMode::SharedTestModeExit => 0b1010,
            BistMode::Reserved(x) => x,
        }
    }
}

bitfield! {
    /// A BIST data object (BDO).
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BistDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// The requested test mode.
        pub mode: u8 [BistMode] @ 28..=31,
    }
}

impl BistDataObject {
    /// Create a BDO for a mode.
    pub fn new(mode: BistMode) -> Self {
        Self(0).with_mode(mode)
    }
}
