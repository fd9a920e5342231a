//! USB-C port manager traits.
//!
//! Provides the traits through which the port manager talks to a Type-C port controller (TCPC):
//! - [`Driver`] moves framed PD messages across the wire,
//! - [`PortController`] exposes CC, VBUS and VCONN control of the port.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
use core::future::Future;

/// Start-of-packet types, used for addressing port partner and cable plugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sop {
    /// The port partner.
    Sop,
    /// The cable plug that is closest to the VCONN source.
    SopPrime,
    /// The far cable plug.
    SopDoublePrime,
    /// Debug messages towards the near cable plug.
    DebugSopPrime,
    /// Debug messages towards the far cable plug.
    DebugSopDoublePrime,
}

/// The power role of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerRole {
    /// The port consumes power.
    Sink,
    /// The port provides power.
    Source,
}

impl From<bool> for PowerRole {
    fn from(value: bool) -> Self {
        match value {
            false => Self::Sink,
            true => Self::Source,
        }
    }
}

impl From<PowerRole> for bool {
    fn from(role: PowerRole) -> bool {
        match role {
            PowerRole::Sink => false,
            PowerRole::Source => true,
        }
    }
}

/// The data role of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRole {
    /// Upstream facing port (device).
    Ufp,
    /// Downstream facing port (host).
    Dfp,
}

impl From<bool> for DataRole {
    fn from(value: bool) -> Self {
        match value {
            false => Self::Ufp,
            true => Self::Dfp,
        }
    }
}

impl From<DataRole> for bool {
    fn from(role: DataRole) -> bool {
        match role {
            DataRole::Ufp => false,
            DataRole::Dfp => true,
        }
    }
}

/// A raw specification revision value that is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnsupportedRevision(pub u8);

/// USB PD specification revisions.
///
/// Ordered, so that the lower of two revisions can be found with `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(non_camel_case_types)]
pub enum SpecificationRevision {
    /// Version 1.0.
    R1_0,
    /// Version 2.0.
    R2_0,
    /// Version 3.x.
    R3_X,
}

impl TryFrom<u8> for SpecificationRevision {
    type Error = UnsupportedRevision;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b00 => Ok(Self::R1_0),
            0b01 => Ok(Self::R2_0),
            0b10 => Ok(Self::R3_X),
            _ => Err(UnsupportedRevision(value)),
        }
    }
}

impl From<SpecificationRevision> for u8 {
    fn from(value: SpecificationRevision) -> Self {
        match value {
            SpecificationRevision::R1_0 => 0b00,
            SpecificationRevision::R2_0 => 0b01,
            SpecificationRevision::R3_X => 0b10,
        }
    }
}

/// Receive Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverRxError {
    /// Received message discarded, e.g. due to CRC errors or buffer overflow.
    Discarded,

    /// Hard Reset received before or during reception.
    HardReset,

    /// The port partner detached.
    Disconnected,

    /// A fast role swap signal was detected on CC.
    FastRoleSwap,
}

/// Transmit Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverTxError {
    /// Concurrent receive in progress or excessive noise on the line.
    Discarded,

    /// No GoodCRC was received after all hardware retries.
    Failed,

    /// Hard Reset received before or during transmission.
    HardReset,

    /// The port partner detached.
    Disconnected,
}

/// Driver trait, through which the protocol layer talks to the PHY.
pub trait Driver {
    /// If this is `true`, the protocol layer will not send its own
    /// GoodCRC messages and will instead rely on the hardware.
    const HAS_AUTO_GOOD_CRC: bool = false;

    /// If this is `true`, the hardware automatically retries transmission
    /// when no GoodCRC is received. The protocol layer will hand the retry count to
    /// [`Driver::transmit`] and skip its own retry loop.
    const HAS_AUTO_RETRY: bool = false;

    /// Receive a packet, returning its start-of-packet type and length.
    fn receive(&mut self, buffer: &mut [u8]) -> impl Future<Output = Result<(Sop, usize), DriverRxError>>;

    /// Transmit a packet.
    ///
    /// `retries` is only meaningful for drivers with [`Driver::HAS_AUTO_RETRY`].
    fn transmit(&mut self, sop: Sop, data: &[u8], retries: u8) -> impl Future<Output = Result<(), DriverTxError>>;

    /// Transmit a hard reset signal.
    fn transmit_hard_reset(&mut self) -> impl Future<Output = Result<(), DriverTxError>>;
}

/// Rp current advertisement values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RpValue {
    /// Default USB power.
    Default,
    /// 1.5 A, also used as SinkTxNG in PD 3.x.
    Current1A5,
    /// 3.0 A, also used as SinkTxOk in PD 3.x.
    Current3A0,
}

/// Termination to present on the CC lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcPull {
    /// No termination.
    Open,
    /// Sink termination.
    Rd,
    /// Source termination.
    Rp(RpValue),
    /// Toggle between Rp and Rd, looking for a connection.
    Drp(RpValue),
}

/// State observed on a single CC line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcState {
    /// Nothing connected.
    Open,
    /// A powered cable or VCONN powered accessory.
    Ra,
    /// A sink.
    Rd,
    /// A source advertising default USB power.
    RpDefault,
    /// A source advertising 1.5 A.
    Rp1A5,
    /// A source advertising 3.0 A.
    Rp3A0,
}

impl CcState {
    /// Whether a source termination is observed.
    pub fn is_rp(&self) -> bool {
        matches!(self, Self::RpDefault | Self::Rp1A5 | Self::Rp3A0)
    }
}

/// Plug orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Communication happens on CC1.
    Cc1,
    /// Communication happens on CC2.
    Cc2,
}

/// The status of both CC lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CcStatus {
    /// State of CC1.
    pub cc1: CcState,
    /// State of CC2.
    pub cc2: CcState,
    /// The controller is still toggling, looking for a connection.
    pub looking_for_connection: bool,
}

impl CcStatus {
    /// Both lines open.
    pub const OPEN: Self = Self {
        cc1: CcState::Open,
        cc2: CcState::Open,
        looking_for_connection: false,
    };

    /// Whether nothing is attached.
    pub fn is_open(&self) -> bool {
        self.cc1 == CcState::Open && self.cc2 == CcState::Open
    }

    /// The line that carries the source termination, as seen by a sink.
    pub fn source_polarity(&self) -> Option<Polarity> {
        match (self.cc1.is_rp(), self.cc2.is_rp()) {
            (true, _) => Some(Polarity::Cc1),
            (false, true) => Some(Polarity::Cc2),
            _ => None,
        }
    }

    /// The line that carries the sink termination, as seen by a source.
    pub fn sink_polarity(&self) -> Option<Polarity> {
        match (self.cc1, self.cc2) {
            (CcState::Rd, _) => Some(Polarity::Cc1),
            (_, CcState::Rd) => Some(Polarity::Cc2),
            _ => None,
        }
    }

    /// Whether the other line shows Ra, so that the cable needs VCONN.
    pub fn has_ra(&self) -> bool {
        self.cc1 == CcState::Ra || self.cc2 == CcState::Ra
    }

    /// The Rp value that the source advertises, as seen by a sink.
    pub fn rp_value(&self) -> Option<RpValue> {
        match self.source_polarity()? {
            Polarity::Cc1 => Self::rp_of(self.cc1),
            Polarity::Cc2 => Self::rp_of(self.cc2),
        }
    }

    fn rp_of(state: CcState) -> Option<RpValue> {
        match state {
            CcState::RpDefault => Some(RpValue::Default),
            CcState::Rp1A5 => Some(RpValue::Current1A5),
            CcState::Rp3A0 => Some(RpValue::Current3A0),
            _ => None,
        }
    }
}

/// VBUS sourcing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VbusSource {
    /// Do not source VBUS.
    Off,
    /// Source vSafe5V.
    Default,
    /// Source a negotiated, non-default voltage.
    NonDefault,
}

/// VBUS levels that can be waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VbusLevel {
    /// VBUS is below vSafe0V.
    Safe0V,
    /// VBUS is above the sink disconnect threshold.
    Present,
}

/// Errors of port control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    /// Communication with the port controller failed.
    Bus,
    /// The port partner detached.
    Disconnected,
    /// Hard Reset received during the operation.
    HardReset,
}

/// Control over the Type-C functions of a port controller.
///
/// All operations are bounded in time, except for the `wait_*` functions.
pub trait PortController: Driver {
    /// Initialize the port controller after power-up or a controller reset.
    fn init(&mut self) -> impl Future<Output = Result<(), ControlError>>;

    /// Set the termination on both CC lines.
    fn set_cc(&mut self, pull: CcPull) -> impl Future<Output = Result<(), ControlError>>;

    /// Change the advertised Rp value, keeping the current termination.
    fn set_rp_value(&mut self, value: RpValue) -> impl Future<Output = Result<(), ControlError>>;

    /// Read the status of both CC lines.
    fn cc_status(&mut self) -> impl Future<Output = Result<CcStatus, ControlError>>;

    /// Start toggling between Rp and Rd, looking for a connection.
    fn look_for_connection(&mut self) -> impl Future<Output = Result<(), ControlError>>;

    /// Wait until the CC status changes.
    fn wait_for_cc_change(&mut self) -> impl Future<Output = Result<CcStatus, ControlError>>;

    /// Select the CC line that is used for communication.
    fn set_polarity(&mut self, polarity: Polarity) -> impl Future<Output = Result<(), ControlError>>;

    /// Update the roles and revision that the controller uses for GoodCRC messages.
    fn set_message_header(
        &mut self,
        power_role: PowerRole,
        data_role: DataRole,
        revision: SpecificationRevision,
    ) -> impl Future<Output = Result<(), ControlError>>;

    /// Enable or disable reception of PD messages.
    fn set_rx_enable(&mut self, enable: bool) -> impl Future<Output = Result<(), ControlError>>;

    /// Control sourcing of VBUS.
    fn set_vbus_source(&mut self, source: VbusSource) -> impl Future<Output = Result<(), ControlError>>;

    /// Control sinking from VBUS.
    fn set_vbus_sink(&mut self, enable: bool) -> impl Future<Output = Result<(), ControlError>>;

    /// Control sourcing of VCONN.
    fn set_vconn(&mut self, enable: bool) -> impl Future<Output = Result<(), ControlError>>;

    /// Whether VBUS is currently at the given level.
    fn is_vbus_level(&mut self, level: VbusLevel) -> impl Future<Output = Result<bool, ControlError>>;

    /// Wait until VBUS reaches the given level.
    fn wait_for_vbus(&mut self, level: VbusLevel) -> impl Future<Output = Result<(), ControlError>>;

    /// Arm or disarm detection of the fast role swap signal.
    fn set_frs_enable(&mut self, enable: bool) -> impl Future<Output = Result<(), ControlError>>;

    /// Transmit the BIST carrier mode 2 pattern.
    fn transmit_bist_carrier(&mut self) -> impl Future<Output = Result<(), ControlError>>;

    /// Enter or exit BIST test data mode, in which received messages are not passed up.
    fn set_bist_test_mode(&mut self, enable: bool) -> impl Future<Output = Result<(), ControlError>>;
}
