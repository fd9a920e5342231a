//! The Type-C state machine detects attach and detach, and runs the policy engine while a partner is attached.
//!
//! The state machine runs in one task per port. The device talks to it through a [`PortChannel`], which
//! delivers [`LifecycleEvent`]s and holds the latest [`TypecStatus`] of the port.
use core::cell::RefCell;
use core::future::pending;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use tcpm_traits::{CcPull, CcStatus, ControlError, Polarity, PortController, VbusLevel, VbusSource};

use crate::config::{DualRolePolicy, PortConfig};
use crate::policy_engine::device_policy_manager::DevicePolicyManager;
use crate::policy_engine::{self, PolicyEngine};
use crate::status::{CcConnection, StatusEvents, TypecStatus};
use crate::timers::{Timer, TimerType};
use crate::{DataRole, PowerRole};

pub mod power;


/// Events that control the life cycle of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecycleEvent {
    /// Initialize the port controller, and start looking for a partner.
    Init,
    /// Disable the port until it is resumed.
    Suspend,
    /// Resume a suspended port.
    Resume,
    /// Disable the port until it is initialized again.
    Shutdown,
    /// Apply a new dual-role policy.
    DualRole(DualRolePolicy),
}

/// Type-C states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// The port is off.
    Disabled,
    /// Both CC lines are opened for tErrorRecovery, which makes the partner detach as well.
    ErrorRecovery,
    /// Nothing attached. The port toggles, or presents a fixed termination.
    Unattached,
    /// A source was seen, and is debounced.
    AttachWaitSnk,
    /// Attached to a source.
    AttachedSnk,
    /// A sink was seen, and is debounced.
    AttachWaitSrc,
    /// Attached to a sink.
    AttachedSrc,
}

impl State {
    /// The name of the state, as reported to the host.
    pub fn name(&self) -> &'static str {
        match self {
            State::Disabled => "Disabled",
            State::ErrorRecovery => "ErrorRecovery",
            State::Unattached => "Unattached",
            State::AttachWaitSnk => "AttachWait.SNK",
            State::AttachedSnk => "Attached.SNK",
            State::AttachWaitSrc => "AttachWait.SRC",
            State::AttachedSrc => "Attached.SRC",
        }
    }

    fn is_attached(&self) -> bool {
        matches!(self, State::AttachedSnk | State::AttachedSrc)
    }
}

/// The state of PD communication while attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pd {
    /// Attached, but not set up yet.
    Idle,
    /// The policy engine runs.
    Running,
    /// No PD communication, either disabled or given up. Only a detach follows.
    Stopped,
}

/// Shared between a port task and the rest of the device.
pub struct PortChannel<M: RawMutex> {
    events: Signal<M, LifecycleEvent>,
    status: Mutex<M, RefCell<TypecStatus>>,
}

impl<M: RawMutex> Default for PortChannel<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> PortChannel<M> {
    /// Create a channel for a disabled port.
    pub fn new() -> Self {
        Self {
            events: Signal::new(),
            status: Mutex::new(RefCell::new(TypecStatus::default())),
        }
    }

    /// Send a life cycle event to the port.
    ///
    /// An event that was not consumed yet is replaced.
    pub fn send(&self, event: LifecycleEvent) {
        self.events.signal(event);
    }

    /// The latest status of the port.
    pub fn status(&self) -> TypecStatus {
        self.status.lock(|status| status.borrow().clone())
    }

    fn publish(&self, new_status: TypecStatus) {
        self.status.lock(|status| *status.borrow_mut() = new_status);
    }
}

/// The state that debounces a CC status that was found while unattached, if any.
fn attach_wait_state(policy: DualRolePolicy, cc_status: &CcStatus) -> Option<State> {
    if cc_status.looking_for_connection {
        return None;
    }

    let may_source = matches!(policy, DualRolePolicy::ToggleOn | DualRolePolicy::ForceSource);
    let may_sink = policy != DualRolePolicy::ForceSource;

    match (cc_status.source_polarity(), cc_status.sink_polarity()) {
        (Some(_), _) if may_sink => Some(State::AttachWaitSnk),
        (_, Some(_)) if may_source => Some(State::AttachWaitSrc),
        _ => None,
    }
}

/// The Type-C state machine of a port, which owns the policy engine.
pub struct TypeC<'a, M: RawMutex, PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> {
    policy_engine: PolicyEngine<PORT, TIMER, DPM>,
    channel: &'a PortChannel<M>,
    state: State,
    dual_role_policy: DualRolePolicy,
    cc_status: CcStatus,
    polarity: Polarity,
    pd: Pd,
    suspended: bool,
    events: StatusEvents,
}

impl<'a, M: RawMutex, PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> TypeC<'a, M, PORT, TIMER, DPM> {
    /// Create the state machine of a port, which stays disabled until [`LifecycleEvent::Init`].
    pub fn new(port_controller: PORT, device_policy_manager: DPM, config: PortConfig, channel: &'a PortChannel<M>) -> Self {
        Self {
            policy_engine: PolicyEngine::new(port_controller, device_policy_manager, config),
            channel,
            state: State::Disabled,
            dual_role_policy: config.dual_role_policy,
            cc_status: CcStatus::OPEN,
            polarity: Polarity::Cc1,
            pd: Pd::Idle,
            suspended: false,
            events: StatusEvents::default(),
        }
    }

    /// The present state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the port is attached without PD communication, because it is disabled or the partner did not answer.
    pub fn pd_stopped(&self) -> bool {
        self.state.is_attached() && self.pd == Pd::Stopped
    }

    /// Access the policy engine, for example to reach the device policy manager.
    pub fn policy_engine(&mut self) -> &mut PolicyEngine<PORT, TIMER, DPM> {
        &mut self.policy_engine
    }

    fn port(&mut self) -> &mut PORT {
        self.policy_engine.port_controller()
    }

    /// Run the port forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_step().await;
        }
    }

    /// Run a single step, which ends early when a life cycle event arrives.
    pub(crate) async fn run_step(&mut self) {
        let channel = self.channel;

        let result = match select(channel.events.wait(), self.update_state()).await {
            Either::First(event) => self.handle_event(event).await,
            Either::Second(result) => result,
        };

        if let Err(_error) = result {
            error!("Port control failed with {:?} in {:?}", _error, self.state);
            self.state = State::ErrorRecovery;
            self.pd = Pd::Idle;
        }

        self.channel.publish(self.status());
    }

    async fn handle_event(&mut self, event: LifecycleEvent) -> Result<(), ControlError> {
        info!("Lifecycle event {:?}", event);

        match event {
            LifecycleEvent::Init => {
                self.suspended = false;
                self.enable().await
            }
            LifecycleEvent::Resume if self.suspended => {
                self.suspended = false;
                self.enable().await
            }
            LifecycleEvent::Resume => Ok(()),
            LifecycleEvent::Suspend | LifecycleEvent::Shutdown => {
                self.suspended = event == LifecycleEvent::Suspend;
                self.transition(State::Disabled).await?;
                self.port().set_cc(CcPull::Open).await
            }
            LifecycleEvent::DualRole(policy) => {
                self.dual_role_policy = policy;

                let new_state = match (self.state, policy) {
                    (State::Unattached | State::AttachWaitSnk | State::AttachWaitSrc, _) => State::Unattached,
                    (State::AttachedSnk, DualRolePolicy::ForceSource)
                    | (State::AttachedSrc, DualRolePolicy::ForceSink) => State::ErrorRecovery,
                    (state, _) => state,
                };

                self.transition(new_state).await
            }
        }
    }

    async fn enable(&mut self) -> Result<(), ControlError> {
        self.transition(State::Disabled).await?;
        self.port().init().await?;
        self.transition(State::Unattached).await
    }

    /// Change state, and undo the setup of an attached state when leaving it.
    async fn transition(&mut self, new_state: State) -> Result<(), ControlError> {
        if new_state == self.state {
            return Ok(());
        }

        debug!("TC {:?} -> {:?}", self.state, new_state);
        if self.state.is_attached() {
            self.detach().await?;
        }

        self.state = new_state;
        Ok(())
    }

    async fn detach(&mut self) -> Result<(), ControlError> {
        self.pd = Pd::Idle;
        self.policy_engine.set_pd_disconnected();
        self.events.set_disconnected(true);

        let port = self.port();
        port.set_rx_enable(false).await?;
        port.set_frs_enable(false).await?;
        port.set_vbus_source(VbusSource::Off).await?;
        port.set_vbus_sink(false).await?;
        port.set_vconn(false).await
    }

    /// Wait for the CC lines to be stable for tCCDebounce.
    async fn debounce(&mut self) -> Result<CcStatus, ControlError> {
        let port = self.port();
        let mut cc_status = port.cc_status().await?;

        loop {
            match select(port.wait_for_cc_change(), TimerType::new::<TIMER>(TimerType::CCDebounce)).await {
                Either::First(changed) => {
                    cc_status = changed?;
                    trace!("CC changed to {:?}, debounce again", cc_status);
                }
                Either::Second(_) => return Ok(cc_status),
            }
        }
    }

    async fn update_state(&mut self) -> Result<(), ControlError> {
        let config = *self.policy_engine.config();

        let new_state = match self.state {
            State::Disabled => pending().await,
            State::ErrorRecovery => {
                let port = self.port();
                port.set_cc(CcPull::Open).await?;
                port.set_vbus_source(VbusSource::Off).await?;
                port.set_vconn(false).await?;

                TimerType::new::<TIMER>(TimerType::ErrorRecovery).await;
                State::Unattached
            }
            State::Unattached => {
                let policy = self.dual_role_policy;
                let port = self.port();

                match policy {
                    DualRolePolicy::ToggleOn => {
                        port.set_cc(CcPull::Drp(config.rp_value)).await?;
                        port.look_for_connection().await?;
                    }
                    DualRolePolicy::ToggleOff | DualRolePolicy::ForceSink => port.set_cc(CcPull::Rd).await?,
                    DualRolePolicy::ForceSource => port.set_cc(CcPull::Rp(config.rp_value)).await?,
                }

                let mut cc_status = port.cc_status().await?;
                loop {
                    if let Some(state) = attach_wait_state(policy, &cc_status) {
                        break state;
                    }

                    cc_status = port.wait_for_cc_change().await?;
                }
            }
            State::AttachWaitSnk => {
                let cc_status = self.debounce().await?;

                match cc_status.source_polarity() {
                    None => State::Unattached,
                    Some(polarity) => {
                        self.cc_status = cc_status;
                        self.polarity = polarity;

                        let port = self.port();
                        match select(
                            port.wait_for_vbus(VbusLevel::Present),
                            TimerType::new::<TIMER>(TimerType::CCDebounce),
                        )
                        .await
                        {
                            Either::First(result) => {
                                result?;
                                State::AttachedSnk
                            }
                            Either::Second(_) => State::AttachWaitSnk,
                        }
                    }
                }
            }
            State::AttachWaitSrc => {
                let cc_status = self.debounce().await?;

                match cc_status.sink_polarity() {
                    None => State::Unattached,
                    Some(polarity) => {
                        self.cc_status = cc_status;
                        self.polarity = polarity;

                        // A source only attaches to a discharged VBUS.
                        let port = self.port();
                        match select(
                            port.wait_for_vbus(VbusLevel::Safe0V),
                            TimerType::new::<TIMER>(TimerType::CCDebounce),
                        )
                        .await
                        {
                            Either::First(result) => {
                                result?;
                                State::AttachedSrc
                            }
                            Either::Second(_) => State::AttachWaitSrc,
                        }
                    }
                }
            }
            State::AttachedSnk | State::AttachedSrc => match self.pd {
                Pd::Idle => self.attach(&config).await?,
                Pd::Running => self.run_policy_engine().await,
                Pd::Stopped => self.wait_for_detach().await?,
            },
        };

        self.transition(new_state).await
    }

    /// Set up power and PD communication after an attach.
    async fn attach(&mut self, config: &PortConfig) -> Result<State, ControlError> {
        let (state, polarity, cc_status) = (self.state, self.polarity, self.cc_status);
        info!("{} on {:?}", state.name(), polarity);

        self.events = StatusEvents::default();
        let port = self.port();
        port.set_polarity(polarity).await?;

        let (power_role, vconn) = if state == State::AttachedSrc {
            port.set_cc(CcPull::Rp(config.rp_value)).await?;
            port.set_vbus_source(VbusSource::Default).await?;

            let vconn = config.vconn_capable && cc_status.has_ra();
            if vconn {
                port.set_vconn(true).await?;
            }

            match select(
                port.wait_for_vbus(VbusLevel::Present),
                TimerType::new::<TIMER>(TimerType::SrcTurnOn),
            )
            .await
            {
                Either::First(result) => result?,
                Either::Second(_) => {
                    error!("VBUS does not turn on");
                    return Ok(State::ErrorRecovery);
                }
            }

            (PowerRole::Source, vconn)
        } else {
            port.set_cc(CcPull::Rd).await?;
            port.set_vbus_sink(true).await?;

            (PowerRole::Sink, false)
        };

        if config.pd_enabled {
            self.port().set_rx_enable(true).await?;
            self.policy_engine.start(power_role, vconn);
            self.pd = Pd::Running;
        } else {
            self.pd = Pd::Stopped;
        }

        Ok(state)
    }

    async fn run_policy_engine(&mut self) -> State {
        match self.policy_engine.run_step().await {
            // A power role swap changes the attached state, without a detach.
            Ok(()) => match self.policy_engine.port_state().power_role {
                PowerRole::Source if self.state == State::AttachedSnk => {
                    debug!("TC {:?} -> {:?} by role swap", self.state, State::AttachedSrc);
                    self.state = State::AttachedSrc;
                    self.state
                }
                PowerRole::Sink if self.state == State::AttachedSrc => {
                    debug!("TC {:?} -> {:?} by role swap", self.state, State::AttachedSnk);
                    self.state = State::AttachedSnk;
                    self.state
                }
                _ => self.state,
            },
            Err(policy_engine::Error::Disconnected) => {
                info!("Partner detached");
                State::Unattached
            }
            Err(policy_engine::Error::PortPartnerUnresponsive) => {
                warn!("Partner does not speak PD, stay attached without it");
                self.pd = Pd::Stopped;
                self.state
            }
            Err(_error) => {
                error!("Policy engine ended with {:?}", _error);
                State::ErrorRecovery
            }
        }
    }

    async fn wait_for_detach(&mut self) -> Result<State, ControlError> {
        let state = self.state;
        let port = self.port();

        let mut cc_status = port.cc_status().await?;
        while !cc_status.is_open() {
            cc_status = port.wait_for_cc_change().await?;
        }

        info!("Detached from {}", state.name());
        Ok(State::Unattached)
    }

    /// The status of the port, for the host.
    fn status(&self) -> TypecStatus {
        let config = self.policy_engine.config();
        let mut status = TypecStatus {
            pd_enabled: config.pd_enabled,
            polarity: self.polarity,
            tc_state: self.state.name(),
            events: self.events,
            ..TypecStatus::default()
        };

        if !self.state.is_attached() {
            return status;
        }

        status.dev_connected = true;
        status.cc_connection = match self.state {
            State::AttachedSrc => CcConnection::UfpAttached,
            _ => CcConnection::DfpAttached,
        };

        if self.pd == Pd::Stopped && !config.pd_enabled {
            (status.power_role, status.data_role) = match self.state {
                State::AttachedSrc => (PowerRole::Source, Some(DataRole::Dfp)),
                _ => (PowerRole::Sink, Some(DataRole::Ufp)),
            };
        } else {
            status.update_from_port(self.policy_engine.port_state());
        }

        status
    }
}
