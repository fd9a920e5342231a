//! Definitions of source capabilities data message content.
use heapless::Vec;
use proc_bitfield::bitfield;
use uom::si::electric_current::centiampere;
use uom::si::electric_potential::{decivolt, millivolt};

use crate::_50milliamperes_mod::_50milliamperes;
use crate::_50millivolts_mod::_50millivolts;
use crate::_250milliwatts_mod::_250milliwatts;
use crate::units::{ElectricCurrent, ElectricPotential, Power};

/// Kinds of supplies that can be reported within source capabilities.
///
/// Ordered as they must appear in a capabilities list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    /// Fixed voltage supply.
    FixedSupply,
    /// Battery supply.
    Battery,
    /// Variable voltage supply.
    VariableSupply,
    /// Programmable power supply.
    Pps,
}

/// A power data object holds information about one type of source capability.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerDataObject {
    /// Fixed voltage supply.
    FixedSupply(FixedSupply),
    /// Battery supply.
    Battery(Battery),
    /// Variable voltage supply.
    VariableSupply(VariableSupply),
    /// SPR programmable power supply.
    Pps(SprProgrammablePowerSupply),
    /// Unknown kind of power data object, e.g. an EPR adjustable voltage supply.
    Unknown(RawPowerDataObject),
}

impl PowerDataObject {
    /// The raw 32 bit representation.
    pub fn to_raw(&self) -> u32 {
        match self {
            Self::FixedSupply(p) => p.0,
            Self::Battery(p) => p.0,
            Self::VariableSupply(p) => p.0,
            Self::Pps(p) => p.0,
            Self::Unknown(p) => p.0,
        }
    }

    /// The kind of supply, if known.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Self::FixedSupply(_) => Some(Kind::FixedSupply),
            Self::Battery(_) => Some(Kind::Battery),
            Self::VariableSupply(_) => Some(Kind::VariableSupply),
            Self::Pps(_) => Some(Kind::Pps),
            Self::Unknown(_) => None,
        }
    }

    /// The (minimum) voltage, used for ordering within a kind.
    pub fn min_voltage(&self) -> ElectricPotential {
        match self {
            Self::FixedSupply(p) => p.voltage(),
            Self::Battery(p) => p.min_voltage(),
            Self::VariableSupply(p) => p.min_voltage(),
            Self::Pps(p) => p.min_voltage(),
            Self::Unknown(_) => ElectricPotential::new::<millivolt>(0),
        }
    }
}

impl From<u32> for PowerDataObject {
    fn from(raw: u32) -> Self {
        let pdo = RawPowerDataObject(raw);
        match (pdo.kind(), pdo.augmented_supply()) {
            (0b00, _) => Self::FixedSupply(FixedSupply(raw)),
            (0b01, _) => Self::Battery(Battery(raw)),
            (0b10, _) => Self::VariableSupply(VariableSupply(raw)),
            (0b11, 0b00) => Self::Pps(SprProgrammablePowerSupply(raw)),
            (_, supply) => {
                warn!("Unknown augmented PDO supply {}", supply);
                Self::Unknown(pdo)
            }
        }
    }
}

bitfield! {
    /// A raw power data object.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RawPowerDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// The kind of power data object.
        pub kind: u8 @ 30..=31,
        /// The kind of augmented supply, for augmented PDOs.
        pub augmented_supply: u8 @ 28..=29,
    }
}

bitfield! {
    /// A fixed voltage supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct FixedSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Fixed supply (00b)
        pub kind: u8 @ 30..=31,
        /// Dual-role power
        pub dual_role_power: bool @ 29,
        /// USB suspend supported
        pub usb_suspend_supported: bool @ 28,
        /// Unconstrained power
        pub unconstrained_power: bool @ 27,
        /// USB communications capable
        pub usb_communications_capable: bool @ 26,
        /// Dual-role data
        pub dual_role_data: bool @ 25,
        /// Unchunked extended messages supported
        pub unchunked_extended_messages_supported: bool @ 24,
        /// Peak current
        pub peak_current: u8 @ 20..=21,
        /// Voltage in 50 mV units
        pub raw_voltage: u16 @ 10..=19,
        /// Maximum current in 10 mA units
        pub raw_max_current: u16 @ 0..=9,
    }
}

impl FixedSupply {
    /// Create a fixed supply PDO.
    pub fn new(voltage: ElectricPotential, max_current: ElectricCurrent) -> Self {
        Self(0)
            .with_raw_voltage(voltage.get::<_50millivolts>() as u16)
            .with_raw_max_current(max_current.get::<centiampere>() as u16)
    }

    /// The fixed output voltage.
    pub fn voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_voltage().into())
    }

    /// The maximum output current.
    pub fn max_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<centiampere>(self.raw_max_current().into())
    }
}

bitfield! {
    /// A battery supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Battery(pub u32): Debug, FromStorage, IntoStorage {
        /// Battery (01b)
        pub kind: u8 @ 30..=31,
        /// Maximum Voltage in 50 mV units
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum Voltage in 50 mV units
        pub raw_min_voltage: u16 @ 10..=19,
        /// Maximum Allowable Power in 250 mW units
        pub raw_max_power: u16 @ 0..=9,
    }
}

impl Battery {
    /// The maximum output voltage.
    pub fn max_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_max_voltage().into())
    }

    /// The minimum output voltage.
    pub fn min_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_min_voltage().into())
    }

    /// The maximum output power.
    pub fn max_power(&self) -> Power {
        Power::new::<_250milliwatts>(self.raw_max_power().into())
    }
}

bitfield! {
    /// A variable (non-battery) supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct VariableSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Variable supply (10b)
        pub kind: u8 @ 30..=31,
        /// Maximum Voltage in 50mV units
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum Voltage in 50mV units
        pub raw_min_voltage: u16 @ 10..=19,
        /// Maximum current in 10mA units
        pub raw_max_current: u16 @ 0..=9,
    }
}

impl VariableSupply {
    /// Create a variable supply PDO.
    pub fn new(min_voltage: ElectricPotential, max_voltage: ElectricPotential, max_current: ElectricCurrent) -> Self {
        Self(0)
            .with_kind(0b10)
            .with_raw_min_voltage(min_voltage.get::<_50millivolts>() as u16)
            .with_raw_max_voltage(max_voltage.get::<_50millivolts>() as u16)
            .with_raw_max_current(max_current.get::<centiampere>() as u16)
    }

    /// The maximum output voltage.
    pub fn max_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_max_voltage().into())
    }

    /// The minimum output voltage.
    pub fn min_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_50millivolts>(self.raw_min_voltage().into())
    }

    /// The maximum output current.
    pub fn max_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<centiampere>(self.raw_max_current().into())
    }
}

bitfield! {
    /// An SPR programmable power supply APDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SprProgrammablePowerSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Augmented power data object (11b)
        pub kind: u8 @ 30..=31,
        /// SPR programmable power supply (00b)
        pub supply: u8 @ 28..=29,
        /// PPS power limited
        pub pps_power_limited: bool @ 27,
        /// Maximum voltage in 100mV increments
        pub raw_max_voltage: u8 @ 17..=24,
        /// Minimum Voltage in 100mV increments
        pub raw_min_voltage: u8 @ 8..=15,
        /// Maximum Current in 50mA increments
        pub raw_max_current: u8 @ 0..=6,
    }
}

impl SprProgrammablePowerSupply {
    /// Create a programmable power supply APDO.
    pub fn new(min_voltage: ElectricPotential, max_voltage: ElectricPotential, max_current: ElectricCurrent) -> Self {
        Self(0)
            .with_kind(0b11)
            .with_raw_min_voltage(min_voltage.get::<decivolt>() as u8)
            .with_raw_max_voltage(max_voltage.get::<decivolt>() as u8)
            .with_raw_max_current(max_current.get::<_50milliamperes>() as u8)
    }

    /// The maximum programmable voltage.
    pub fn max_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<decivolt>(self.raw_max_voltage().into())
    }

    /// The minimum programmable voltage.
    pub fn min_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<decivolt>(self.raw_min_voltage().into())
    }

    /// The maximum output current.
    pub fn max_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<_50milliamperes>(self.raw_max_current().into())
    }
}

/// Reasons for a capabilities list to be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidCapabilities {
    /// The list holds no PDOs.
    Empty,
    /// The first PDO is not a fixed 5 V supply.
    FirstNotVsafe5V,
    /// The PDO at the given (1-based) position has an unknown kind.
    UnknownKind(u8),
    /// The PDO at the given (1-based) position breaks the ordering.
    OutOfOrder(u8),
}

/// A list of source capabilities, as sent in a Source_Capabilities message.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceCapabilities(pub Vec<PowerDataObject, 7>);

impl SourceCapabilities {
    /// The first PDO, which must be the vSafe5V fixed supply.
    pub fn vsafe_5v(&self) -> Option<&FixedSupply> {
        match self.0.first() {
            Some(PowerDataObject::FixedSupply(supply)) => Some(supply),
            _ => None,
        }
    }

    /// Whether the source is dual-role power capable.
    pub fn dual_role_power(&self) -> bool {
        self.vsafe_5v().map(FixedSupply::dual_role_power).unwrap_or_default()
    }

    /// Whether the source supports USB suspend.
    pub fn usb_suspend_supported(&self) -> bool {
        self.vsafe_5v()
            .map(FixedSupply::usb_suspend_supported)
            .unwrap_or_default()
    }

    /// Whether the source has unconstrained power.
    pub fn unconstrained_power(&self) -> bool {
        self.vsafe_5v()
            .map(FixedSupply::unconstrained_power)
            .unwrap_or_default()
    }

    /// Whether the source is dual-role data capable.
    pub fn dual_role_data(&self) -> bool {
        self.vsafe_5v().map(FixedSupply::dual_role_data).unwrap_or_default()
    }

    /// Get power data objects (PDOs) from the source.
    pub fn pdos(&self) -> &[PowerDataObject] {
        &self.0
    }

    /// The PDO at a 1-based object position.
    pub fn pdo_at_object_position(&self, position: u8) -> Option<&PowerDataObject> {
        position.checked_sub(1).and_then(|index| self.0.get(index as usize))
    }

    /// Check that the list is well formed.
    ///
    /// Fixed supplies come first with strictly ascending voltage, starting at 5 V. Battery, variable and
    /// programmable supplies follow in that order, each group non-decreasing in minimum voltage.
    pub fn validate(&self) -> Result<(), InvalidCapabilities> {
        let vsafe_5v = self.vsafe_5v().ok_or(if self.0.is_empty() {
            InvalidCapabilities::Empty
        } else {
            InvalidCapabilities::FirstNotVsafe5V
        })?;

        if vsafe_5v.raw_voltage() != 100 {
            return Err(InvalidCapabilities::FirstNotVsafe5V);
        }

        let mut previous: Option<(Kind, ElectricPotential)> = None;

        for (index, pdo) in self.0.iter().enumerate() {
            let position = index as u8 + 1;
            let kind = pdo.kind().ok_or(InvalidCapabilities::UnknownKind(position))?;
            let voltage = pdo.min_voltage();

            if let Some((previous_kind, previous_voltage)) = previous {
                let ordered = match kind.cmp(&previous_kind) {
                    core::cmp::Ordering::Greater => true,
                    core::cmp::Ordering::Less => false,
                    core::cmp::Ordering::Equal if kind == Kind::FixedSupply => voltage > previous_voltage,
                    core::cmp::Ordering::Equal => voltage >= previous_voltage,
                };

                if !ordered {
                    return Err(InvalidCapabilities::OutOfOrder(position));
                }
            }

            previous = Some((kind, voltage));
        }

        Ok(())
    }
}
