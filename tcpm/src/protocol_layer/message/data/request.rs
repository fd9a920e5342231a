//! Definitions of request message content.
use proc_bitfield::bitfield;
use uom::si::electric_current::centiampere;

use super::source_capabilities::{Kind, PowerDataObject, SourceCapabilities};
use crate::_20millivolts_mod::_20millivolts;
use crate::_50milliamperes_mod::_50milliamperes;
use crate::_250milliwatts_mod::_250milliwatts;
use crate::units::{ElectricCurrent, ElectricPotential, Power};

bitfield! {
    /// A request data object, before its layout is known.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RawRequest(pub u32): Debug, FromStorage, IntoStorage {
        /// Position of the requested PDO, starting at 1.
        pub object_position: u8 @ 28..=31,
        /// The sink cannot be satisfied by any of the offered PDOs.
        pub capability_mismatch: bool @ 26,
        /// USB communications capable
        pub usb_communications_capable: bool @ 25,
        /// No USB suspend
        pub no_usb_suspend: bool @ 24,
        /// Unchunked extended messages supported
        pub unchunked_extended_messages_supported: bool @ 23,
    }
}

bitfield! {
    /// Request for a fixed or variable supply.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedVariableSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Position of the requested PDO, starting at 1.
        pub object_position: u8 @ 28..=31,
        pub giveback_flag: bool @ 27,
        pub capability_mismatch: bool @ 26,
        pub usb_communications_capable: bool @ 25,
        pub no_usb_suspend: bool @ 24,
        pub unchunked_extended_messages_supported: bool @ 23,
        /// Operating current in 10 mA units
        pub raw_operating_current: u16 @ 10..=19,
        /// Maximum operating current in 10 mA units
        pub raw_max_operating_current: u16 @ 0..=9,
    }
}

impl FixedVariableSupply {
    /// The operating current.
    pub fn operating_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<centiampere>(self.raw_operating_current().into())
    }

    /// The maximum operating current.
    pub fn max_operating_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<centiampere>(self.raw_max_operating_current().into())
    }
}

bitfield! {
    /// Request for a battery supply.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Battery(pub u32): Debug, FromStorage, IntoStorage {
        /// Position of the requested PDO, starting at 1.
        pub object_position: u8 @ 28..=31,
        pub giveback_flag: bool @ 27,
        pub capability_mismatch: bool @ 26,
        pub usb_communications_capable: bool @ 25,
        pub no_usb_suspend: bool @ 24,
        pub unchunked_extended_messages_supported: bool @ 23,
        /// Operating power in 250 mW units
        pub raw_operating_power: u16 @ 10..=19,
        /// Maximum operating power in 250 mW units
        pub raw_max_operating_power: u16 @ 0..=9,
    }
}

impl Battery {
    /// The operating power.
    pub fn operating_power(&self) -> Power {
        Power::new::<_250milliwatts>(self.raw_operating_power().into())
    }
}

bitfield! {
    /// Request for a programmable power supply.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Pps(pub u32): Debug, FromStorage, IntoStorage {
        /// Position of the requested PDO, starting at 1.
        pub object_position: u8 @ 28..=31,
        pub capability_mismatch: bool @ 26,
        pub usb_communications_capable: bool @ 25,
        pub no_usb_suspend: bool @ 24,
        pub unchunked_extended_messages_supported: bool @ 23,
        /// Output voltage in 20 mV units
        pub raw_output_voltage: u16 @ 9..=20,
        /// Operating current in 50 mA units
        pub raw_operating_current: u16 @ 0..=6,
    }
}

impl Pps {
    /// The requested output voltage.
    pub fn output_voltage(&self) -> ElectricPotential {
        ElectricPotential::new::<_20millivolts>(self.raw_output_voltage().into())
    }

    /// The operating current.
    pub fn operating_current(&self) -> ElectricCurrent {
        ElectricCurrent::new::<_50milliamperes>(self.raw_operating_current().into())
    }
}

/// Power requests towards the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSource {
    /// Request for a fixed or variable supply.
    FixedVariableSupply(FixedVariableSupply),
    /// Request for a battery supply.
    Battery(Battery),
    /// Request for a programmable power supply.
    Pps(Pps),
}

/// Errors that can occur when building a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A requested voltage does not exist in the PDOs.
    VoltageMismatch,
}

/// Requestable voltage levels.
#[derive(Debug, Clone, Copy)]
pub enum VoltageRequest {
    /// The safe 5 V supply.
    Safe5V,
    /// The highest fixed voltage that the source can supply.
    Highest,
    /// A specific fixed voltage.
    Specific(ElectricPotential),
}

/// Requestable currents.
#[derive(Debug, Clone, Copy)]
pub enum CurrentRequest {
    /// The highest current that the source can supply.
    Highest,
    /// A specific current.
    Specific(ElectricCurrent),
}

impl PowerSource {
    /// Interpret a raw request against the capabilities that it answers.
    ///
    /// Returns `None` if the object position does not refer to a known PDO.
    pub fn from_raw(raw: RawRequest, source_capabilities: &SourceCapabilities) -> Option<Self> {
        let pdo = source_capabilities.pdo_at_object_position(raw.object_position())?;

        Some(match pdo.kind()? {
            Kind::FixedSupply | Kind::VariableSupply => Self::FixedVariableSupply(FixedVariableSupply(raw.0)),
            Kind::Battery => Self::Battery(Battery(raw.0)),
            Kind::Pps => Self::Pps(Pps(raw.0)),
        })
    }

    /// The raw request data object.
    pub fn to_raw(&self) -> RawRequest {
        RawRequest(match self {
            Self::FixedVariableSupply(p) => p.0,
            Self::Battery(p) => p.0,
            Self::Pps(p) => p.0,
        })
    }

    /// The position of the requested PDO, starting at 1.
    pub fn object_position(&self) -> u8 {
        self.to_raw().object_position()
    }

    /// Whether the source can supply what is requested, with the given capabilities.
    pub fn is_satisfiable(&self, source_capabilities: &SourceCapabilities) -> bool {
        let Some(pdo) = source_capabilities.pdo_at_object_position(self.object_position()) else {
            return false;
        };

        match (self, pdo) {
            (Self::FixedVariableSupply(rdo), PowerDataObject::FixedSupply(supply)) => {
                rdo.operating_current() <= supply.max_current()
            }
            (Self::FixedVariableSupply(rdo), PowerDataObject::VariableSupply(supply)) => {
                rdo.operating_current() <= supply.max_current()
            }
            (Self::Battery(rdo), PowerDataObject::Battery(supply)) => rdo.operating_power() <= supply.max_power(),
            (Self::Pps(rdo), PowerDataObject::Pps(supply)) => {
                rdo.output_voltage() >= supply.min_voltage()
                    && rdo.output_voltage() <= supply.max_voltage()
                    && rdo.operating_current() <= supply.max_current()
            }
            _ => false,
        }
    }

    /// Create a new power source request for a fixed supply.
    ///
    /// Finds a suitable PDO by evaluating the provided current and voltage requests against the source capabilities.
    pub fn new_fixed(
        current_request: CurrentRequest,
        voltage_request: VoltageRequest,
        source_capabilities: &SourceCapabilities,
    ) -> Result<Self, Error> {
        let mut fixed_supplies = source_capabilities
            .pdos()
            .iter()
            .enumerate()
            .filter_map(|(index, pdo)| match pdo {
                PowerDataObject::FixedSupply(supply) => Some((index, supply)),
                _ => None,
            });

        let (index, supply) = match voltage_request {
            VoltageRequest::Safe5V => source_capabilities.vsafe_5v().map(|supply| (0, supply)),
            VoltageRequest::Highest => fixed_supplies.max_by_key(|(_, supply)| supply.raw_voltage()),
            VoltageRequest::Specific(voltage) => fixed_supplies.find(|(_, supply)| supply.voltage() == voltage),
        }
        .ok_or(Error::VoltageMismatch)?;

        let (current, mismatch) = match current_request {
            CurrentRequest::Highest => (supply.max_current(), false),
            CurrentRequest::Specific(x) => (x, x > supply.max_current()),
        };

        let raw_current = (current.get::<centiampere>() as u16).min(0x3ff);

        Ok(Self::FixedVariableSupply(
            FixedVariableSupply(0)
                .with_raw_operating_current(raw_current)
                .with_raw_max_operating_current(raw_current)
                .with_object_position(index as u8 + 1)
                .with_capability_mismatch(mismatch)
                .with_no_usb_suspend(true)
                .with_usb_communications_capable(true),
        ))
    }

    /// Create a new power source request for a programmable power supply (PPS).
    pub fn new_pps(
        current_request: CurrentRequest,
        voltage: ElectricPotential,
        source_capabilities: &SourceCapabilities,
    ) -> Result<Self, Error> {
        let (index, supply) = source_capabilities
            .pdos()
            .iter()
            .enumerate()
            .find_map(|(index, pdo)| match pdo {
                PowerDataObject::Pps(supply) if supply.min_voltage() <= voltage && supply.max_voltage() >= voltage => {
                    Some((index, supply))
                }
                _ => None,
            })
            .ok_or(Error::VoltageMismatch)?;

        let (current, mismatch) = match current_request {
            CurrentRequest::Highest => (supply.max_current(), false),
            CurrentRequest::Specific(x) => (x, x > supply.max_current()),
        };

        Ok(Self::Pps(
            Pps(0)
                .with_raw_output_voltage(voltage.get::<_20millivolts>() as u16)
                .with_raw_operating_current((current.get::<_50milliamperes>() as u16).min(0x7f))
                .with_object_position(index as u8 + 1)
                .with_capability_mismatch(mismatch)
                .with_no_usb_suspend(true)
                .with_usb_communications_capable(true),
        ))
    }
}
