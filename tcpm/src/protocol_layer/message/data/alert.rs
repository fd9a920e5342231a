//! Alert data objects (ADO).
use proc_bitfield::bitfield;

bitfield! {
    /// An alert data object.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AlertDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// All alert type bits.
        pub type_of_alert: u8 @ 24..=31,
        /// An extended alert event is reported in the low nibble.
        pub extended_alert: bool @ 31,
        /// Over-voltage protection event (source only).
        pub ovp: bool @ 30,
        /// Source input change event.
        pub source_input_change: bool @ 29,
        /// Operating condition change.
        pub operating_condition_change: bool @ 28,
        /// Over-temperature protection event.
        pub otp: bool @ 27,
        /// Over-current protection event (source only).
        pub ocp: bool @ 26,
        /// Battery status change event.
        pub battery_status_change: bool @ 25,
        /// Fixed batteries that changed status, one bit each.
        pub fixed_batteries: u8 @ 20..=23,
        /// Hot swappable batteries that changed status, one bit each.
        pub hot_swappable_batteries: u8 @ 16..=19,
        /// Extended alert event type.
        pub extended_alert_event_type: u8 @ 0..=3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_bits() {
        let ado = AlertDataObject::default()
            .with_battery_status_change(true)
            .with_fixed_batteries(0b0001);
        assert_eq!(ado.0, 0x0210_0000);
        assert_eq!(ado.type_of_alert(), 0x02);
    }
}
