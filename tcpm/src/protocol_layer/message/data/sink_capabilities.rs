//! Definitions of sink capabilities data message content.
//!
//! Sinks report the power levels that they can operate at in answer to Get_Sink_Cap.
use heapless::Vec;
use proc_bitfield::bitfield;
use uom::si::electric_current::centiampere;

use super::source_capabilities::RawPowerDataObject;
use crate::_50millivolts_mod::_50millivolts;
use crate::_250milliwatts_mod::_250milliwatts;
use crate::units::{ElectricCurrent, ElectricPotential, Power};

/// Current that a sink requires after a fast role swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FastRoleSwapCurrent {
    /// Fast role swap is not supported.
    #[default]
    NotSupported,
    /// Default USB power.
    DefaultUsbPower,
    /// 1.5 A at 5 V.
    Current1A5,
    /// 3.0 A at 5 V.
    Current3A0,
}

impl From<u8> for FastRoleSwapCurrent {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::NotSupported,
            0b01 => Self::DefaultUsbPower,
            0b10 => Self::Current1A5,
            _ => Self::Current3A0,
        }
    }
}

impl From<FastRoleSwapCurrent> for u8 {
    fn from(value: FastRoleSwapCurrent) -> Self {
        match value {
            FastRoleSwapCurrent::NotSupported => 0b00,
            FastRoleSwapCurrent::DefaultUsbPower => 0b01,
            FastRoleSwapCurrent::Current1A5 => 0b10,
            FastRoleSwapCurrent::Current3A0 => 0b11,
        }
    }
}

bitfield! {
    /// A sink fixed supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SinkFixedSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Fixed supply (00b)
        pub kind: u8 @ 30..=31,
        /// Dual-role power
        pub dual_role_power: bool @ 29,
        /// Set if the sink needs more than vSafe5V for full functionality
        pub higher_capability: bool @ 28,
        /// Unconstrained power
        pub unconstrained_power: bool @ 27,
        /// USB communications capable
        pub usb_communications_capable: bool @ 26,
        /// Dual-role data
        pub dual_role_data: bool @ 25,
        /// Current required after a fast role swap
        pub fast_role_swap: u8 [FastRoleSwapCurrent] @ 23..=24,
        /// Voltage in 50 mV units
        pub raw_voltage: u16 @ 10..=19,
        /// Operational current in 10 mA units
        pub raw_operational_current: u16 @ 0..=9,
    }
}

impl SinkFixedSupply {
    /// Create a fixed supply requirement.
    pub fn new(voltage: ElectricPotential, operational_current: ElectricCurrent) -> Self {
        Self(0)
            .with_raw_voltage(voltage.get::<_50millivolts>() as u16)
            .with_raw_operational_current(operational_current.get::<centiampere>() as u16)
    }

    /// The required voltage.
    pub fn voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_voltage().into())
    }

    /// The operational current.
    pub fn operational_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<centiampere>(self.raw_operational_current().into())
    }
}

bitfield! {
    /// A sink battery supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SinkBattery(pub u32): Debug, FromStorage, IntoStorage {
        /// Battery (01b)
        pub kind: u8 @ 30..=31,
        /// Maximum Voltage in 50 mV units
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum Voltage in 50 mV units
        pub raw_min_voltage: u16 @ 10..=19,
        /// Operational Power in 250 mW units
        pub raw_operational_power: u16 @ 0..=9,
    }
}

impl SinkBattery {
    /// The operational power.
    pub fn operational_power(&self) -> Power {
        Power::new::<_250milliwatts>(self.raw_operational_power().into())
    }
}

bitfield! {
    /// A sink variable supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SinkVariableSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Variable supply (10b)
        pub kind: u8 @ 30..=31,
        /// Maximum Voltage in 50mV units
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum Voltage in 50mV units
        pub raw_min_voltage: u16 @ 10..=19,
        /// Operational current in 10mA units
        pub raw_operational_current: u16 @ 0..=9,
    }
}

impl SinkVariableSupply {
    /// The maximum voltage.
    pub fn max_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_max_voltage().into())
    }

    /// The minimum voltage.
    pub fn min_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_min_voltage().into())
    }
}

/// A sink power data object.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SinkPowerDataObject {
    /// Fixed voltage supply requirement.
    FixedSupply(SinkFixedSupply),
    /// Battery supply requirement.
    Battery(SinkBattery),
    /// Variable voltage supply requirement.
    VariableSupply(SinkVariableSupply),
    /// Augmented or unknown requirement, kept raw.
    Unknown(RawPowerDataObject),
}

impl SinkPowerDataObject {
    /// Convert the PDO to its raw u32 representation.
    pub fn to_raw(&self) -> u32 {
        match self {
            Self::FixedSupply(f) => f.0,
            Self::Battery(b) => b.0,
            Self::VariableSupply(v) => v.0,
            Self::Unknown(u) => u.0,
        }
    }
}

impl From<u32> for SinkPowerDataObject {
    fn from(raw: u32) -> Self {
        match RawPowerDataObject(raw).kind() {
            0b00 => Self::FixedSupply(SinkFixedSupply(raw)),
            0b01 => Self::Battery(SinkBattery(raw)),
            0b10 => Self::VariableSupply(SinkVariableSupply(raw)),
            _ => Self::Unknown(RawPowerDataObject(raw)),
        }
    }
}

/// Sink capabilities message content.
///
/// The first PDO is always the vSafe5V fixed supply.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SinkCapabilities(pub Vec<SinkPowerDataObject, 7>);

impl SinkCapabilities {
    /// Create sink capabilities with a single vSafe5V PDO.
    pub fn new_vsafe5v_only(operational_current: ElectricCurrent) -> Self {
        let vsafe_5v = SinkFixedSupply::default()
            .with_raw_voltage(100)
            .with_raw_operational_current(operational_current.get::<centiampere>() as u16);

        let mut pdos = Vec::new();
        pdos.push(SinkPowerDataObject::FixedSupply(vsafe_5v)).ok();
        Self(pdos)
    }

    /// Get the PDOs.
    pub fn pdos(&self) -> &[SinkPowerDataObject] {
        &self.0
    }

    /// Get the number of PDOs.
    pub fn num_objects(&self) -> u8 {
        self.0.len() as u8
    }
}
