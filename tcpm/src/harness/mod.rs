//! A simulated port, which runs the complete stack on top of a register level port controller model.
//!
//! Time is virtual, so that scenarios with long timeouts complete immediately.
pub mod clock;
pub mod partner;
pub mod tcpc;

mod scenarios;

use clock::VirtualTimer;
use partner::Partner;
use tcpc::{AlertLine, MockTcpc, TcpcHandle};
use tcpm_traits::PortController;

use crate::config::PortConfig;
use crate::dummy::DummyDevice;
use crate::policy_engine::{Error, PolicyEngine};
use crate::tcpci::Tcpci;
use crate::{PowerRole, SpecificationRevision};

pub type SimulatedTcpci = Tcpci<MockTcpc, AlertLine>;
pub type SimulatedEngine = PolicyEngine<SimulatedTcpci, VirtualTimer, DummyDevice>;

/// The configuration of simulated ports.
pub fn config() -> PortConfig {
    PortConfig {
        discover_identity: false,
        ..PortConfig::default()
    }
}

/// A policy engine that is attached to a simulated partner.
pub struct Harness {
    pub tcpc: TcpcHandle,
    pub partner: Partner,
    pub pe: SimulatedEngine,
}

impl Harness {
    /// Start a port in `power_role`, with a partner of the opposite role that speaks `revision`.
    pub async fn new(power_role: PowerRole, revision: SpecificationRevision) -> Self {
        clock::reset();
        let (tcpc, mut tcpci) = TcpcHandle::new();

        tcpci.set_rx_enable(true).await.unwrap();
        match power_role {
            PowerRole::Sink => tcpc.set_partner_vbus(true),
            PowerRole::Source => tcpci.set_vbus_source(tcpm_traits::VbusSource::Default).await.unwrap(),
        }

        let partner_role = match power_role {
            PowerRole::Sink => PowerRole::Source,
            PowerRole::Source => PowerRole::Sink,
        };

        let mut pe = PolicyEngine::new(tcpci, DummyDevice::default(), config());
        pe.start(power_role, false);

        Self {
            tcpc,
            partner: Partner::new(partner_role, revision),
            pe,
        }
    }

    pub async fn step(&mut self) -> Result<(), Error> {
        self.pe.run_step().await
    }

    /// Step until `done` holds after a step, for at most `max_steps` steps.
    pub async fn run_until(&mut self, max_steps: usize, done: impl Fn(&SimulatedEngine) -> bool) {
        for _ in 0..max_steps {
            self.step().await.unwrap();
            if done(&self.pe) {
                return;
            }
        }

        panic!("Not done after {} steps", max_steps);
    }
}
