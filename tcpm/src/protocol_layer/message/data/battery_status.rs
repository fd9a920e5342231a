//! Battery status data objects (BSDO).
use proc_bitfield::bitfield;

bitfield! {
    /// A battery status data object.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BatteryStatusDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// Present capacity in 0.1 Wh units, 0xFFFF when unknown.
        pub present_capacity: u16 @ 16..=31,
        /// Charging status: 0 charging, 1 discharging, 2 idle.
        pub charging_status: u8 @ 10..=11,
        /// The battery is present.
        pub battery_present: bool @ 9,
        /// The battery reference does not exist.
        pub invalid_reference: bool @ 8,
    }
}

impl BatteryStatusDataObject {
    /// The answer for a battery reference that does not exist.
    pub fn invalid_reference_status() -> Self {
        Self(0).with_present_capacity(0xFFFF).with_invalid_reference(true)
    }
}
