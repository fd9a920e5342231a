//! The device policy manager (DPM) allows a device to control the policy engine, and be informed about status changes.
//!
//! For example, through the DPM, a device offers its source capabilities, picks a power level from the
//! capabilities of a source, decides on role swaps, and answers information requests of the port partner.
use core::future::Future;

use heapless::Vec;
use uom::si::electric_current::milliampere;
use uom::si::electric_potential::millivolt;

use super::PortState;
use crate::protocol_layer::message::data::alert::AlertDataObject;
use crate::protocol_layer::message::data::battery_status::BatteryStatusDataObject;
use crate::protocol_layer::message::data::request::{self, PowerSource};
use crate::protocol_layer::message::data::revision::RevisionDataObject;
use crate::protocol_layer::message::data::sink_capabilities::SinkCapabilities;
use crate::protocol_layer::message::data::source_capabilities::{FixedSupply, PowerDataObject, SourceCapabilities};
use crate::protocol_layer::message::data::vendor_defined::Identity;
use crate::protocol_layer::message::extended::{
    BatteryCapabilities, CountryCodes, ManufacturerInfo, SourceCapabilitiesExtended, Status,
};
use crate::units::{ElectricCurrent, ElectricPotential};

/// Events that the device policy manager can send to the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Empty event.
    None,
    /// As a sink, request a certain power level.
    RequestPower(PowerSource),
    /// As a sink, request source capabilities (again).
    RequestSourceCapabilities,
    /// As a source, request the sink capabilities of the port partner.
    RequestSinkCapabilities,
    /// As a source, advertise changed source capabilities.
    UpdateSourceCapabilities,
    /// Swap the data role.
    DrSwap,
    /// Swap the power role.
    PrSwap,
    /// Swap the VCONN source.
    VconnSwap,
    /// Discover the identity of the port partner.
    DiscoverIdentity,
    /// Ask the port partner for its PD revision.
    GetRevision,
    /// Send an alert to the port partner.
    SendAlert(AlertDataObject),
    /// Reset the port with hard reset signaling.
    HardReset,
    /// Reset the protocol layers of both ports.
    SoftReset,
}

/// Responses to requests of the port partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// The request is granted.
    Accept,
    /// The request is refused.
    Reject,
    /// The request may be granted later.
    Wait,
}

/// Trait for the device policy manager.
///
/// This entity commands the policy engine and enforces device policy.
/// Every function has a default, so that a device only implements what it supports.
pub trait DevicePolicyManager {
    /// The capabilities that the port offers as a source.
    ///
    /// Defaults to 5 V at 1.5 A.
    fn source_capabilities(&self) -> SourceCapabilities {
        let mut pdos = Vec::new();
        pdos.push(PowerDataObject::FixedSupply(FixedSupply::new(
            ElectricPotential::new::<millivolt>(5000),
            ElectricCurrent::new::<milliampere>(1500),
        )))
        .ok();

        SourceCapabilities(pdos)
    }

    /// The capabilities that the port reports as a sink.
    ///
    /// Defaults to 5 V at 1.5 A.
    fn sink_capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::new_vsafe5v_only(ElectricCurrent::new::<milliampere>(1500))
    }

    /// As a source, evaluate a request of the sink.
    ///
    /// Defaults to accepting every request that the capabilities can satisfy.
    fn evaluate_request(
        &mut self,
        request: &PowerSource,
        source_capabilities: &SourceCapabilities,
    ) -> impl Future<Output = Response> {
        async move {
            if request.is_satisfiable(source_capabilities) {
                Response::Accept
            } else {
                Response::Reject
            }
        }
    }

    /// As a source, change the supply to the level that was accepted.
    fn transition_supply(&mut self, _accepted: &PowerSource) -> impl Future<Output = ()> {
        async {}
    }

    /// As a sink, request a power source.
    ///
    /// Defaults to 5 V at maximum current.
    fn request(&mut self, source_capabilities: &SourceCapabilities) -> impl Future<Output = PowerSource> {
        async move {
            PowerSource::new_fixed(
                request::CurrentRequest::Highest,
                request::VoltageRequest::Safe5V,
                source_capabilities,
            )
            .unwrap_or(PowerSource::FixedVariableSupply(
                request::FixedVariableSupply(0)
                    .with_object_position(1)
                    .with_capability_mismatch(true),
            ))
        }
    }

    /// As a sink, transition to the power level that the source accepted.
    fn transition_power(&mut self, _accepted: &PowerSource) -> impl Future<Output = ()> {
        async {}
    }

    /// Inform the device about the capabilities of a source.
    fn inform_source_capabilities(&mut self, _source_capabilities: &SourceCapabilities) -> impl Future<Output = ()> {
        async {}
    }

    /// Inform the device about the capabilities of a sink.
    fn inform_sink_capabilities(&mut self, _sink_capabilities: &SinkCapabilities) -> impl Future<Output = ()> {
        async {}
    }

    /// Return power supply and data roles to their defaults, after a hard reset.
    fn hard_reset(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Decide on a data role swap that the port partner requested.
    fn evaluate_dr_swap(&mut self) -> impl Future<Output = Response> {
        async { Response::Accept }
    }

    /// Decide on a power role swap that the port partner requested.
    fn evaluate_pr_swap(&mut self) -> impl Future<Output = Response> {
        async { Response::Reject }
    }

    /// Decide on a VCONN swap that the port partner requested.
    fn evaluate_vconn_swap(&mut self) -> impl Future<Output = Response> {
        async { Response::Reject }
    }

    /// Inform the device about an alert of the port partner.
    fn alert(&mut self, _alert: AlertDataObject) -> impl Future<Output = ()> {
        async {}
    }

    /// The identity that is reported in answer to Discover Identity. `None` results in a NAK.
    fn identity(&self) -> Option<Identity> {
        None
    }

    /// The SVIDs that are reported in answer to Discover SVIDs. Empty results in a NAK.
    fn svids(&self) -> Vec<u16, 12> {
        Vec::new()
    }

    /// The modes of an SVID, reported in answer to Discover Modes. Empty results in a NAK.
    fn modes(&self, _svid: u16) -> Vec<u32, 6> {
        Vec::new()
    }

    /// Extended source capabilities. `None` results in Not_Supported.
    fn source_capabilities_extended(&self) -> Option<SourceCapabilitiesExtended> {
        None
    }

    /// Port status. `None` results in Not_Supported.
    fn status(&self) -> Option<Status> {
        None
    }

    /// Capabilities of a battery. `None` results in Not_Supported.
    fn battery_capabilities(&self, _reference: u8) -> Option<BatteryCapabilities> {
        None
    }

    /// Status of a battery. `None` results in Not_Supported.
    fn battery_status(&self, _reference: u8) -> Option<BatteryStatusDataObject> {
        None
    }

    /// Manufacturer info of the port or a battery. `None` results in Not_Supported.
    fn manufacturer_info(&self, _target: u8, _reference: u8) -> Option<ManufacturerInfo> {
        None
    }

    /// Country codes. `None` results in Not_Supported.
    fn country_codes(&self) -> Option<CountryCodes> {
        None
    }

    /// The revision and version that is reported in answer to Get_Revision.
    fn revision(&self) -> RevisionDataObject {
        RevisionDataObject::R3_1_V1_8
    }

    /// The policy engine gets and evaluates device policy events when ready.
    ///
    /// By default, this is a future that never resolves.
    fn get_event(&mut self, _port: &PortState) -> impl Future<Output = Event> {
        async { core::future::pending().await }
    }
}
