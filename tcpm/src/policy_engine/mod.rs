//! The policy engine (PE) negotiates power contracts, swaps roles and answers requests of the port partner.
//!
//! One engine serves both power roles. Its states are grouped in families (source, sink, swap, VDM
//! and shared states), and every step of the engine is a single pass through [`PolicyEngine::update_state`].
//! Protocol errors are mapped to recovery states in one place, [`PolicyEngine::run_step`].
use core::future::pending;

use embassy_futures::select::{Either3, select3};
use heapless::Vec;
use tcpm_traits::{ControlError, PortController, RpValue};

use crate::config::PortConfig;
use crate::counters::{Counter, CounterType};
use crate::protocol_layer::message::Payload;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::bist::BistMode;
use crate::protocol_layer::message::data::request::PowerSource;
use crate::protocol_layer::message::data::revision::RevisionDataObject;
use crate::protocol_layer::message::data::sink_capabilities::SinkCapabilities;
use crate::protocol_layer::message::data::source_capabilities::SourceCapabilities;
use crate::protocol_layer::message::data::vendor_defined::Identity;
use crate::protocol_layer::message::extended::Extended;
use crate::protocol_layer::message::header::{ControlMessageType, Header, MessageType};
use crate::protocol_layer::message::Message;
use crate::protocol_layer::{ProtocolError, ProtocolLayer, RxError, TxError};
use crate::timers::{Timer, TimerType};
use crate::{DataRole, PowerRole, Sop, SpecificationRevision};

pub mod device_policy_manager;
mod shared;
mod sink;
mod source;
mod swap;
mod vdm;


use device_policy_manager::{DevicePolicyManager, Event};
use shared::Shared;
use sink::Sink;
use source::Source;
use swap::Swap;
use vdm::Vdm;

/// Per-port flags of the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags {
    /// An explicit contract is in place.
    pub explicit_contract: bool,
    /// The port partner answered a PD message since attach.
    pub pd_connected: bool,
    /// The port sources VCONN.
    pub vconn_source: bool,
    /// The port partner entered an alternate mode.
    pub modal_operation: bool,
    /// A power role swap is in progress.
    pub power_role_swap: bool,
    /// The source answered the last request with Wait.
    pub wait_received: bool,
    /// As a source, SinkTxOk is advertised on CC.
    pub sink_tx_ok: bool,
    /// BIST test data mode is active.
    pub bist_test_data: bool,
}

/// The state of a port, as seen by the policy engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PortState {
    /// The present power role.
    pub power_role: PowerRole,
    /// The present data role.
    pub data_role: DataRole,
    /// Flags of the port.
    pub flags: Flags,
    /// The revision that is used towards the port partner.
    pub revision: SpecificationRevision,
    /// The request of the explicit contract. Its object position selects the PDO.
    pub contract: Option<PowerSource>,
    /// Source capabilities of the port partner.
    pub source_capabilities: Option<SourceCapabilities>,
    /// Sink capabilities of the port partner.
    pub sink_capabilities: Option<SinkCapabilities>,
    /// Identity of the port partner.
    pub partner_identity: Option<Identity>,
    /// SVIDs of the port partner.
    pub partner_svids: Vec<u16, 12>,
    /// Revision and version that the port partner reported.
    pub partner_revision: Option<RevisionDataObject>,
}

impl PortState {
    fn new(power_role: PowerRole, revision: SpecificationRevision) -> Self {
        Self {
            power_role,
            data_role: default_data_role(power_role),
            flags: Flags::default(),
            revision,
            contract: None,
            source_capabilities: None,
            sink_capabilities: None,
            partner_identity: None,
            partner_svids: Vec::new(),
            partner_revision: None,
        }
    }
}

fn default_data_role(power_role: PowerRole) -> DataRole {
    match power_role {
        PowerRole::Source => DataRole::Dfp,
        PowerRole::Sink => DataRole::Ufp,
    }
}

/// Policy engine states.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Src(Source),
    Snk(Sink),
    Swap(Swap),
    Vdm(Vdm),
    Shared(Shared),
}

/// Errors that end the policy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The port partner does not answer, even after hard resets.
    PortPartnerUnresponsive,
    /// The port partner detached.
    Disconnected,
    /// The port must go through Type-C error recovery.
    ErrorRecovery,
    /// A protocol error has occured.
    Protocol(ProtocolError),
}

impl From<ProtocolError> for Error {
    fn from(protocol_error: ProtocolError) -> Self {
        Error::Protocol(protocol_error)
    }
}

impl From<ControlError> for Error {
    fn from(control_error: ControlError) -> Self {
        match control_error {
            ControlError::Bus => Error::ErrorRecovery,
            ControlError::Disconnected => Error::Disconnected,
            ControlError::HardReset => Error::Protocol(ProtocolError::RxError(RxError::HardReset)),
        }
    }
}

/// Timers that can end the ready state.
enum Wakeup {
    SinkRequest,
    RetryEvent,
    DiscoverIdentity,
}

/// The policy engine of a port.
pub struct PolicyEngine<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> {
    protocol_layer: ProtocolLayer<PORT, TIMER>,
    device_policy_manager: DPM,
    config: PortConfig,
    state: State,
    port: PortState,
    /// The capabilities that were last advertised as a source.
    advertised_capabilities: Option<SourceCapabilities>,
    /// A DPM event that waits for SinkTxOk.
    deferred_event: Option<Event>,
    /// Whether VCONN is sourced by default, as found on attach.
    default_vconn_source: bool,
    caps_counter: Counter,
    hard_reset_counter: Counter,
    discover_identity_counter: Counter,
    dr_swap_counter: Counter,
    vconn_swap_counter: Counter,
}

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    /// Create a new policy engine, which is idle until it is started.
    pub fn new(port_controller: PORT, device_policy_manager: DPM, config: PortConfig) -> Self {
        let header = Header::new_template(DataRole::Ufp, PowerRole::Sink, config.revision);
        let mut protocol_layer = ProtocolLayer::new(port_controller, header);
        protocol_layer.set_chunking(config.extended_messages);

        Self {
            protocol_layer,
            device_policy_manager,
            config,
            state: State::Snk(Sink::Startup),
            port: PortState::new(PowerRole::Sink, config.revision),
            advertised_capabilities: None,
            deferred_event: None,
            default_vconn_source: false,
            caps_counter: Counter::new(CounterType::Caps),
            hard_reset_counter: Counter::new(CounterType::HardReset),
            discover_identity_counter: Counter::new(CounterType::DiscoverIdentity),
            dr_swap_counter: Counter::new(CounterType::DrSwapAttempt),
            vconn_swap_counter: Counter::new(CounterType::VconnSwap),
        }
    }

    /// Start over in a power role, after an attach.
    pub fn start(&mut self, power_role: PowerRole, vconn_source: bool) {
        info!("Start policy engine as {:?}", power_role);

        self.port = PortState::new(power_role, self.config.revision);
        self.port.flags.vconn_source = vconn_source;
        self.default_vconn_source = vconn_source;
        self.advertised_capabilities = None;
        self.deferred_event = None;

        self.caps_counter.reset();
        self.hard_reset_counter.reset();
        self.discover_identity_counter.reset();
        self.dr_swap_counter.reset();
        self.vconn_swap_counter.reset();

        self.protocol_layer.hard_reset_state();
        self.protocol_layer.set_roles(power_role, self.port.data_role);

        self.state = match power_role {
            PowerRole::Source => State::Src(Source::Startup),
            PowerRole::Sink => State::Snk(Sink::Startup),
        };
    }

    /// Access the port controller.
    pub fn port_controller(&mut self) -> &mut PORT {
        self.protocol_layer.driver()
    }

    /// Access the device policy manager.
    pub fn device_policy_manager(&mut self) -> &mut DPM {
        &mut self.device_policy_manager
    }

    /// The state of the port.
    pub fn port_state(&self) -> &PortState {
        &self.port
    }

    /// Whether the policy engine rests in the ready state of its power role.
    pub(crate) fn is_ready(&self) -> bool {
        self.state == self.ready_state()
    }

    /// The configuration of the port.
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Note that PD communication ended, for example after giving up on an unresponsive partner.
    pub fn set_pd_disconnected(&mut self) {
        self.port.flags.pd_connected = false;
        self.port.flags.explicit_contract = false;
    }

    /// Run the policy engine until it ends with an error.
    ///
    /// Errors are not recoverable within the policy engine. The Type-C state machine decides
    /// on what follows.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            self.run_step().await?;
        }
    }

    /// Run a single step of the state machine, and recover from protocol errors.
    pub(crate) async fn run_step(&mut self) -> Result<(), Error> {
        let error = match self.update_state().await {
            Ok(()) => return Ok(()),
            Err(Error::Protocol(error)) => error,
            Err(error) => {
                error!("Unrecoverable error {:?} in state {:?}", error, self.state);
                return Err(error);
            }
        };

        let hard_reset = self.hard_reset_state();
        let new_state = match (&self.state, error) {
            (_, ProtocolError::RxError(RxError::HardReset) | ProtocolError::TxError(TxError::HardReset)) => {
                Some(match self.port.power_role {
                    PowerRole::Source => State::Src(Source::HardResetReceived),
                    PowerRole::Sink => State::Snk(Sink::TransitionToDefault),
                })
            }

            (_, ProtocolError::RxError(RxError::Disconnected) | ProtocolError::TxError(TxError::Disconnected)) => {
                return Err(Error::Disconnected);
            }

            // Past the point of no return, a failed power role swap needs error recovery.
            (
                State::Swap(
                    Swap::PrsSrcSnkTransitionToOff
                    | Swap::PrsSrcSnkWaitSourceOn
                    | Swap::PrsSnkSrcTransitionToOff
                    | Swap::PrsSnkSrcSourceOn
                    | Swap::FrsSnkSrcStart,
                ),
                _error,
            ) => {
                error!("Power role swap failed with {:?}", _error);
                Some(State::Shared(Shared::WaitForErrorRecovery))
            }

            (_, ProtocolError::RxError(RxError::FastRoleSwap)) => {
                if self.port.power_role == PowerRole::Sink && self.config.fast_role_swap {
                    Some(State::Swap(Swap::FrsSnkSrcStart))
                } else {
                    warn!("Ignore fast role swap signal");
                    None
                }
            }

            (_, ProtocolError::RxError(RxError::SoftReset)) => Some(State::Shared(Shared::SoftReset)),

            // A soft reset of a cable plug that fails is not escalated.
            (State::Shared(Shared::SendSoftReset(sop)), _) if *sop != Sop::Sop => Some(self.ready_state()),

            (State::Shared(Shared::SoftReset | Shared::SendSoftReset(_)), _) => Some(hard_reset),

            (State::Src(Source::TransitionSupply(_)) | State::Snk(Sink::TransitionSink(_)), _) => Some(hard_reset),

            (
                State::Src(Source::SendCapabilities)
                | State::Snk(Sink::WaitForCapabilities | Sink::SelectCapability(_)),
                ProtocolError::RxError(RxError::ReceiveTimeout),
            ) => Some(hard_reset),

            (State::Src(Source::SendCapabilities), ProtocolError::TransmitRetriesExceeded(_)) => Some(hard_reset),

            (State::Swap(Swap::VcsWaitForVconn), ProtocolError::RxError(RxError::ReceiveTimeout)) => Some(hard_reset),

            // Only a hard reset ends test data mode.
            (State::Shared(Shared::BistTestData), _) => None,

            (_, ProtocolError::RxError(RxError::ChunkingNotSupported)) => Some(State::Shared(Shared::ChunkReceived)),

            (_state, ProtocolError::RxError(RxError::ReceiveTimeout)) => {
                debug!("Timeout in {:?}", _state);
                Some(self.ready_state())
            }

            (_, ProtocolError::RxError(RxError::UnsupportedMessage)) => Some(State::Shared(Shared::SendNotSupported)),

            // Soft reset is sent irrespective of AMS ownership.
            (
                _,
                _error @ (ProtocolError::UnexpectedMessage
                | ProtocolError::ChunkSequence
                | ProtocolError::Parse(_)
                | ProtocolError::TransmitRetriesExceeded(_)),
            ) => {
                warn!("Protocol error {:?}, soft reset", _error);
                Some(State::Shared(Shared::SendSoftReset(Sop::Sop)))
            }
        };

        if let Some(state) = new_state {
            self.set_state(state);
        }

        Ok(())
    }

    fn set_state(&mut self, state: State) {
        if state != self.state {
            debug!("PE {:?} -> {:?}", self.state, state);
        }

        self.state = state;
    }

    async fn update_state(&mut self) -> Result<(), Error> {
        let state = self.state.clone();

        let new_state = match &state {
            State::Src(source) => self.update_source_state(source).await?,
            State::Snk(sink) => self.update_sink_state(sink).await?,
            State::Swap(swap) => self.update_swap_state(swap).await?,
            State::Vdm(vdm) => self.update_vdm_state(vdm).await?,
            State::Shared(shared) => self.update_shared_state(shared).await?,
        };

        self.set_state(new_state);
        Ok(())
    }

    /// The ready state of the present power role.
    fn ready_state(&self) -> State {
        match self.port.power_role {
            PowerRole::Source => State::Src(Source::Ready),
            PowerRole::Sink => State::Snk(Sink::Ready),
        }
    }

    /// The hard reset state of the present power role.
    fn hard_reset_state(&self) -> State {
        match self.port.power_role {
            PowerRole::Source => State::Src(Source::HardReset),
            PowerRole::Sink => State::Snk(Sink::HardReset),
        }
    }

    /// The revision towards the port partner.
    fn revision(&self) -> SpecificationRevision {
        self.protocol_layer.revision(Sop::Sop)
    }

    /// The answer to messages that are not supported.
    fn not_supported(&self) -> ControlMessageType {
        if self.revision() >= SpecificationRevision::R3_X {
            ControlMessageType::NotSupported
        } else {
            ControlMessageType::Reject
        }
    }

    /// Program the header that the port controller uses for its own replies.
    async fn update_message_header(&mut self) -> Result<(), Error> {
        self.port.revision = self.revision();

        let (power_role, data_role, revision) = (self.port.power_role, self.port.data_role, self.port.revision);
        self.protocol_layer
            .driver()
            .set_message_header(power_role, data_role, revision)
            .await?;

        Ok(())
    }

    async fn set_power_role(&mut self, power_role: PowerRole) -> Result<(), Error> {
        info!("Power role {:?} -> {:?}", self.port.power_role, power_role);
        self.port.power_role = power_role;
        self.protocol_layer.set_roles(power_role, self.port.data_role);
        self.update_message_header().await
    }

    async fn set_data_role(&mut self, data_role: DataRole) -> Result<(), Error> {
        info!("Data role {:?} -> {:?}", self.port.data_role, data_role);
        self.port.data_role = data_role;
        self.protocol_layer.set_roles(self.port.power_role, data_role);
        self.update_message_header().await
    }

    /// Forget everything that a hard reset invalidates.
    fn clear_after_hard_reset(&mut self) {
        let flags = &mut self.port.flags;
        flags.explicit_contract = false;
        flags.modal_operation = false;
        flags.power_role_swap = false;
        flags.wait_received = false;
        flags.sink_tx_ok = false;
        flags.bist_test_data = false;

        self.port.contract = None;
        self.port.data_role = default_data_role(self.port.power_role);
        self.deferred_event = None;
        self.protocol_layer.hard_reset_state();
        self.protocol_layer.set_roles(self.port.power_role, self.port.data_role);
    }

    /// Take ownership of the next AMS.
    ///
    /// With PD 3.x, a source advertises SinkTxNG before it starts an AMS, and a sink only starts one while
    /// SinkTxOk is advertised. Returns `false` if the sink has to wait.
    async fn begin_ams(&mut self) -> Result<bool, Error> {
        if self.revision() < SpecificationRevision::R3_X {
            return Ok(true);
        }

        match self.port.power_role {
            PowerRole::Source => {
                if self.port.flags.sink_tx_ok {
                    self.protocol_layer.driver().set_rp_value(RpValue::Current1A5).await?;
                    self.port.flags.sink_tx_ok = false;
                    TimerType::new::<TIMER>(TimerType::SinkTx).await;
                }

                Ok(true)
            }
            PowerRole::Sink => {
                let cc_status = self.protocol_layer.driver().cc_status().await?;
                Ok(cc_status.rp_value() == Some(RpValue::Current3A0))
            }
        }
    }

    /// As a PD 3.x source, allow the sink to start an AMS.
    async fn advertise_sink_tx_ok(&mut self) -> Result<(), Error> {
        if self.revision() >= SpecificationRevision::R3_X && !self.port.flags.sink_tx_ok {
            self.protocol_layer.driver().set_rp_value(RpValue::Current3A0).await?;
            self.port.flags.sink_tx_ok = true;
        }

        Ok(())
    }

    fn should_discover_identity(&self) -> bool {
        self.config.discover_identity
            && self.port.data_role == DataRole::Dfp
            && self.port.partner_identity.is_none()
            && self.discover_identity_counter.value() < self.discover_identity_counter.max_value()
    }

    /// Wait in the ready state for a message, a DPM event or a timer.
    async fn ready(&mut self) -> Result<State, Error> {
        let sink_request = self.port.power_role == PowerRole::Sink && self.port.flags.wait_received;
        let retry_event = self.deferred_event.is_some();
        let discover_identity = self.should_discover_identity();

        let device_policy_manager = &mut self.device_policy_manager;
        let port = &self.port;

        let receive_fut = self.protocol_layer.receive();
        let event_fut = async move {
            if retry_event {
                pending().await
            } else {
                device_policy_manager.get_event(port).await
            }
        };
        let timers_fut = async {
            let sink_request_fut = async {
                match sink_request {
                    true => TimerType::new::<TIMER>(TimerType::SinkRequest).await,
                    false => pending().await,
                }
            };
            let retry_event_fut = async {
                match retry_event {
                    true => TimerType::new::<TIMER>(TimerType::SinkTx).await,
                    false => pending().await,
                }
            };
            let discover_identity_fut = async {
                match discover_identity {
                    true => TimerType::new::<TIMER>(TimerType::DiscoverIdentity).await,
                    false => pending().await,
                }
            };

            match select3(sink_request_fut, retry_event_fut, discover_identity_fut).await {
                Either3::First(_) => Wakeup::SinkRequest,
                Either3::Second(_) => Wakeup::RetryEvent,
                Either3::Third(_) => Wakeup::DiscoverIdentity,
            }
        };

        let outcome = select3(receive_fut, event_fut, timers_fut).await;

        match outcome {
            Either3::First(received) => {
                let (sop, message) = received?;
                Ok(self.message_state(sop, message))
            }
            Either3::Second(event) => self.event_state(event).await,
            Either3::Third(Wakeup::SinkRequest) => {
                self.port.flags.wait_received = false;
                match self.port.contract {
                    Some(contract) => Ok(State::Snk(Sink::SelectCapability(contract))),
                    None => Ok(self.ready_state()),
                }
            }
            Either3::Third(Wakeup::RetryEvent) => match self.deferred_event.take() {
                Some(event) => self.event_state(event).await,
                None => Ok(self.ready_state()),
            },
            Either3::Third(Wakeup::DiscoverIdentity) => match self.begin_ams().await? {
                true => Ok(State::Vdm(Vdm::IdentityRequest(Sop::Sop))),
                false => Ok(self.ready_state()),
            },
        }
    }

    /// Find the state that handles a message that was received in the ready state.
    fn message_state(&mut self, sop: Sop, message: Message) -> State {
        let source = self.port.power_role == PowerRole::Source;
        let message_type = message.header.message_type();
        trace!("Received {:?} on {:?}", message_type, sop);

        if sop != Sop::Sop {
            debug!("Drop unsolicited cable message {:?}", message_type);
            return self.ready_state();
        }

        match (message_type, message.payload) {
            (MessageType::Control(control), _) => match control {
                ControlMessageType::Ping => State::Src(Source::Ping),
                ControlMessageType::GetSourceCap if source || self.config.dual_role_power => {
                    State::Src(Source::GiveSourceCap)
                }
                ControlMessageType::GetSinkCap if !source || self.config.dual_role_power => {
                    State::Snk(Sink::GiveSinkCap)
                }
                ControlMessageType::DrSwap => State::Swap(Swap::DrsEvaluateSwap),
                ControlMessageType::PrSwap if source => State::Swap(Swap::PrsSrcSnkEvaluateSwap),
                ControlMessageType::PrSwap => State::Swap(Swap::PrsSnkSrcEvaluateSwap),
                ControlMessageType::VconnSwap => State::Swap(Swap::VcsEvaluateSwap),
                ControlMessageType::GetSourceCapExtended => State::Shared(Shared::GiveSourceCapExtended),
                ControlMessageType::GetStatus => State::Shared(Shared::GiveStatus),
                ControlMessageType::GetCountryCodes => State::Shared(Shared::GiveCountryCodes),
                ControlMessageType::GetRevision => State::Shared(Shared::GiveRevision),
                _ => State::Shared(Shared::SendNotSupported),
            },
            (_, Some(Payload::Data(data))) => match data {
                Data::Request(request) if source => State::Src(Source::NegotiateCapability(request)),
                Data::SourceCapabilities(capabilities) if !source => State::Snk(Sink::EvaluateCapability(capabilities)),
                Data::Bist(bist) => match bist.mode() {
                    BistMode::CarrierMode2 => State::Shared(Shared::BistTx),
                    BistMode::TestData => State::Shared(Shared::BistTestData),
                    _mode => {
                        debug!("Ignore BIST mode {:?}", _mode);
                        self.ready_state()
                    }
                },
                Data::Alert(alert) => State::Shared(Shared::AlertReceived(alert)),
                Data::VendorDefined(vdm) => State::Vdm(Vdm::Response(vdm)),
                _ => State::Shared(Shared::SendNotSupported),
            },
            (_, Some(Payload::Extended(extended))) => match extended {
                Extended::GetBatteryCap(reference) => State::Shared(Shared::GiveBatteryCap(reference)),
                Extended::GetBatteryStatus(reference) => State::Shared(Shared::GiveBatteryStatus(reference)),
                Extended::GetManufacturerInfo { target, reference } => {
                    State::Shared(Shared::GiveManufacturerInfo { target, reference })
                }
                _ => State::Shared(Shared::SendNotSupported),
            },
            (_, None) => State::Shared(Shared::SendNotSupported),
        }
    }

    /// Find the state that handles an event of the device policy manager.
    async fn event_state(&mut self, event: Event) -> Result<State, Error> {
        let source = self.port.power_role == PowerRole::Source;
        let pd3 = self.revision() >= SpecificationRevision::R3_X;
        debug!("DPM event {:?}", event);

        let state = match event {
            Event::None => return Ok(self.ready_state()),
            Event::HardReset => return Ok(self.hard_reset_state()),
            Event::SoftReset => return Ok(State::Shared(Shared::SendSoftReset(Sop::Sop))),
            Event::RequestPower(power_source) if !source => State::Snk(Sink::SelectCapability(power_source)),
            Event::RequestSourceCapabilities if !source => State::Snk(Sink::GetSourceCap),
            Event::RequestSinkCapabilities => State::Src(Source::GetSinkCap),
            Event::UpdateSourceCapabilities if source => State::Src(Source::SendCapabilities),
            Event::DrSwap => State::Swap(Swap::DrsSendSwap),
            Event::PrSwap if source => State::Swap(Swap::PrsSrcSnkSendSwap),
            Event::PrSwap => State::Swap(Swap::PrsSnkSrcSendSwap),
            Event::VconnSwap => State::Swap(Swap::VcsSendSwap),
            Event::DiscoverIdentity => State::Vdm(Vdm::IdentityRequest(Sop::Sop)),
            Event::GetRevision if pd3 => State::Shared(Shared::GetRevision),
            Event::SendAlert(alert) if pd3 => State::Shared(Shared::SendAlert(alert)),
            _event => {
                warn!("Event {:?} does not apply to the port", _event);
                return Ok(self.ready_state());
            }
        };

        if !self.begin_ams().await? {
            debug!("Defer event until SinkTxOk");
            self.deferred_event = Some(event);
            return Ok(self.ready_state());
        }

        Ok(state)
    }
}
