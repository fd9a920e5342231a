//! A USB Type-C port manager with a USB Power Delivery stack, for `[no_std]` targets.
//!
//! The stack is layered as follows:
//! - [`tcpci`]: register level driver for TCPCI compliant port controllers,
//! - [`protocol_layer`]: message framing, retries, GoodCRC handling and chunking,
//! - [`policy_engine`]: the source, sink and dual-role policy engine,
//! - [`type_c`]: attach and detach handling, which starts and stops the policy engine.
//!
//! A device integrates the stack by implementing [`policy_engine::device_policy_manager::DevicePolicyManager`]
//! and [`timers::Timer`], and running [`type_c::TypeC::run`] in one task per port.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod fmt;

pub mod config;
pub mod counters;
pub mod policy_engine;
pub mod protocol_layer;
pub mod status;
pub mod tcpci;
pub mod timers;
pub mod type_c;

#[cfg(test)]
pub mod dummy;

#[cfg(test)]
mod harness;

#[macro_use]
extern crate uom;

pub use tcpm_traits::{DataRole, PowerRole, Sop, SpecificationRevision};

mod _20millivolts_mod {
    unit! {
        system: uom::si;
        quantity: uom::si::electric_potential;

        @_20millivolts: 0.02; "_20mV", "_20millivolts", "_20millivolts";
    }
}

mod _50milliamperes_mod {
    unit! {
        system: uom::si;
        quantity: uom::si::electric_current;

        @_50milliamperes: 0.05; "_50mA", "_50milliamps", "_50milliamps";
    }
}

mod _50millivolts_mod {
    unit! {
        system: uom::si;
        quantity: uom::si::electric_potential;

        @_50millivolts: 0.05; "_50mV", "_50millivolts", "_50millivolts";
    }
}

mod _250milliwatts_mod {
    unit! {
        system: uom::si;
        quantity: uom::si::power;

        @_250milliwatts: 0.25; "_250mW", "_250milliwatts", "_250milliwatts";
    }
}

/// Units with integer storage, scaled so that PD quantities are represented exactly.
///
/// Potentials are stored in mV, currents in mA and power in µW.
pub mod units {
    ISQ!(
        uom::si,
        u32,
        (millimeter, kilogram, second, milliampere, kelvin, mole, candela)
    );
}
