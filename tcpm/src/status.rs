//! The port status that is reported to the host, in the layout of the `EC_CMD_TYPEC_STATUS` response.
use byteorder::{ByteOrder, LittleEndian};
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use proc_bitfield::bitfield;
use tcpm_traits::Polarity;

use crate::policy_engine::PortState;
use crate::type_c::PortChannel;
use crate::{DataRole, PowerRole, SpecificationRevision};

/// Size of the serialized status.
pub const TYPEC_STATUS_SIZE: usize = 108;

/// Maximum length of the Type-C state name, including its terminating zero.
const TC_STATE_NAME_LEN: usize = 32;

/// The number of PDOs that the status reports per direction.
const MAX_REPORTED_PDOS: usize = 7;

/// Result codes of host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HostResult {
    /// The command succeeded.
    Success = 0,
    /// The command failed.
    Error = 2,
    /// A parameter was out of range, such as the port number.
    InvalidParam = 3,
}

/// The CC state, as the host knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CcConnection {
    /// Nothing attached.
    None = 0,
    /// A sink is attached to the port, which is a DFP.
    UfpAttached = 4,
    /// A source is attached to the port, which is a UFP.
    DfpAttached = 5,
}

bitfield! {
    /// Status events that the host can observe.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct StatusEvents(pub u32): Debug, FromStorage, IntoStorage {
        /// Discovery of the SOP port partner finished.
        pub sop_discovery_done: bool @ 0,
        /// Discovery of the SOP' cable plug finished.
        pub sop_prime_discovery_done: bool @ 1,
        /// A hard reset happened.
        pub hard_reset: bool @ 2,
        /// The port partner detached.
        pub disconnected: bool @ 3,
    }
}

/// The status of a Type-C port.
#[derive(Debug, Clone, PartialEq)]
pub struct TypecStatus {
    /// Whether PD communication is enabled on the port.
    pub pd_enabled: bool,
    /// Whether something is attached.
    pub dev_connected: bool,
    /// Whether the port partner communicates over PD.
    pub sop_connected: bool,
    /// The power role of the port.
    pub power_role: PowerRole,
    /// The data role of the port. `None` while detached.
    pub data_role: Option<DataRole>,
    /// Whether the port sources VCONN.
    pub vconn_source: bool,
    /// The CC line that is used for communication.
    pub polarity: Polarity,
    /// The kind of attached partner.
    pub cc_connection: CcConnection,
    /// The name of the Type-C state.
    pub tc_state: &'static str,
    /// Pending status events.
    pub events: StatusEvents,
    /// BCD revision and version of the SOP port partner, zero without PD.
    pub sop_revision: u16,
    /// BCD revision and version of the cable plug, zero without a PD capable cable.
    pub sop_prime_revision: u16,
    /// Source capabilities of the port partner.
    pub source_capabilities: Vec<u32, MAX_REPORTED_PDOS>,
    /// Sink capabilities of the port partner.
    pub sink_capabilities: Vec<u32, MAX_REPORTED_PDOS>,
}

impl Default for TypecStatus {
    fn default() -> Self {
        Self {
            pd_enabled: false,
            dev_connected: false,
            sop_connected: false,
            power_role: PowerRole::Sink,
            data_role: None,
            vconn_source: false,
            polarity: Polarity::Cc1,
            cc_connection: CcConnection::None,
            tc_state: "Disabled",
            events: StatusEvents::default(),
            sop_revision: 0,
            sop_prime_revision: 0,
            source_capabilities: Vec::new(),
            sink_capabilities: Vec::new(),
        }
    }
}

/// The BCD revision that is reported for a partner, which only tells the major revision.
fn bcd_revision(revision: SpecificationRevision) -> u16 {
    match revision {
        SpecificationRevision::R1_0 => 0x1000,
        SpecificationRevision::R2_0 => 0x2000,
        SpecificationRevision::R3_X => 0x3000,
    }
}

impl TypecStatus {
    /// Fill in what the policy engine knows about the port partner.
    pub(crate) fn update_from_port(&mut self, port: &PortState) {
        self.sop_connected = port.flags.pd_connected;
        self.power_role = port.power_role;
        self.data_role = Some(port.data_role);
        self.vconn_source = port.flags.vconn_source;
        self.events
            .set_sop_discovery_done(port.partner_identity.is_some());

        self.sop_revision = match (port.flags.pd_connected, port.partner_revision) {
            (false, _) => 0,
            // Revision and version occupy the upper half of the RMDO.
            (true, Some(revision)) => (revision.0 >> 16) as u16,
            (true, None) => bcd_revision(port.revision),
        };

        self.source_capabilities = port
            .source_capabilities
            .iter()
            .flat_map(|capabilities| capabilities.pdos().iter())
            .map(|pdo| pdo.to_raw())
            .take(MAX_REPORTED_PDOS)
            .collect();
        self.sink_capabilities = port
            .sink_capabilities
            .iter()
            .flat_map(|capabilities| capabilities.pdos().iter())
            .map(|pdo| pdo.to_raw())
            .take(MAX_REPORTED_PDOS)
            .collect();
    }

    /// Serialize the status into a host response buffer, returning the number of written bytes.
    ///
    /// The buffer must hold at least [`TYPEC_STATUS_SIZE`] bytes.
    pub fn to_bytes(&self, buf: &mut [u8]) -> usize {
        let buf = &mut buf[..TYPEC_STATUS_SIZE];
        buf.fill(0);

        buf[0] = self.pd_enabled.into();
        buf[1] = self.dev_connected.into();
        buf[2] = self.sop_connected.into();
        buf[3] = self.source_capabilities.len() as u8;
        buf[4] = match self.power_role {
            PowerRole::Sink => 0,
            PowerRole::Source => 1,
        };
        buf[5] = match self.data_role {
            Some(DataRole::Ufp) => 0,
            Some(DataRole::Dfp) => 1,
            None => 2,
        };
        buf[6] = self.vconn_source.into();
        buf[7] = self.sink_capabilities.len() as u8;
        buf[8] = match self.polarity {
            Polarity::Cc1 => 0,
            Polarity::Cc2 => 1,
        };
        buf[9] = self.cc_connection as u8;
        // DP pin and mux state (10 and 11) stay zero, alternate modes are not entered.

        let name = self.tc_state.as_bytes();
        let name_len = name.len().min(TC_STATE_NAME_LEN - 1);
        buf[12..12 + name_len].copy_from_slice(&name[..name_len]);

        LittleEndian::write_u32(&mut buf[44..], self.events.0);
        LittleEndian::write_u16(&mut buf[48..], self.sop_revision);
        LittleEndian::write_u16(&mut buf[50..], self.sop_prime_revision);

        for (index, pdo) in self.source_capabilities.iter().enumerate() {
            LittleEndian::write_u32(&mut buf[52 + 4 * index..], *pdo);
        }

        for (index, pdo) in self.sink_capabilities.iter().enumerate() {
            LittleEndian::write_u32(&mut buf[80 + 4 * index..], *pdo);
        }

        TYPEC_STATUS_SIZE
    }
}

/// Answer the `EC_CMD_TYPEC_STATUS` host command for a port.
///
/// Returns the response size on success.
pub fn typec_status<M: RawMutex>(
    ports: &[&PortChannel<M>],
    port: u8,
    response: &mut [u8],
) -> Result<usize, HostResult> {
    let Some(channel) = ports.get(port as usize) else {
        warn!("Status of unknown port {}", port);
        return Err(HostResult::InvalidParam);
    };

    if response.len() < TYPEC_STATUS_SIZE {
        return Err(HostResult::Error);
    }

    Ok(channel.status().to_bytes(response))
}
