//! Implements a dummy port controller, timer and device for testing.
use std::collections::VecDeque;
use std::future::pending;
use std::vec::Vec;

use tcpm_traits::{
    CcPull, CcState, CcStatus, ControlError, Driver, DriverRxError, DriverTxError, Polarity, PortController, RpValue,
    VbusLevel, VbusSource,
};

use crate::policy_engine::PortState;
use crate::policy_engine::device_policy_manager::{DevicePolicyManager, Event, Response};
use crate::protocol_layer::message::Message;
use crate::protocol_layer::message::data::alert::AlertDataObject;
use crate::protocol_layer::message::data::request::PowerSource;
use crate::protocol_layer::message::data::source_capabilities::SourceCapabilities;
use crate::protocol_layer::message::data::vendor_defined::{IdHeader, Identity, ProductVdo};
use crate::protocol_layer::message::extended::CountryCodes;
use crate::protocol_layer::message::header::{Header, MessageType};
use crate::timers::Timer;
use crate::{DataRole, PowerRole, Sop, SpecificationRevision};

/// Maximum frame size that the dummy driver stores.
const MAX_FRAME: usize = 30;

/// A transmitted frame, as recorded by the dummy driver.
#[derive(Debug, Clone)]
pub struct Transmission {
    /// Start of packet.
    pub sop: Sop,
    /// The raw frame.
    pub data: heapless::Vec<u8, MAX_FRAME>,
    /// The retry count that was handed to the driver.
    pub retries: u8,
}

impl Transmission {
    /// Parse the header of the transmitted frame.
    pub fn header(&self) -> Header {
        Header::from_bytes(&self.data).unwrap()
    }

    /// The type of the transmitted message.
    pub fn message_type(&self) -> MessageType {
        self.header().message_type()
    }

    /// Parse the transmitted frame as a complete message.
    pub fn message(&self) -> Message {
        Message::from_bytes(&self.data).unwrap()
    }
}

/// A dummy timer for testing.
///
/// Expires immediately, so that every wait on the port partner fails fast,
/// unless the expected frames were injected beforehand.
pub struct DummyTimer {}

impl Timer for DummyTimer {
    async fn after_millis(_milliseconds: u64) {}
}

/// A dummy driver for testing.
///
/// The driver acknowledges every transmission with a GoodCRC, unless told otherwise.
/// Receiving from an empty queue never completes.
pub struct DummyDriver {
    rx_queue: VecDeque<Result<(Sop, heapless::Vec<u8, MAX_FRAME>), DriverRxError>>,
    tx_queue: VecDeque<Transmission>,
    failed_transmissions: usize,
    /// The number of transmitted hard resets.
    pub hard_resets: usize,
    /// The CC status that is reported.
    pub cc_status: CcStatus,
    /// The last termination that was set.
    pub cc_pull: CcPull,
    /// The last advertised Rp value.
    pub rp_value: Option<RpValue>,
    /// The selected polarity.
    pub polarity: Option<Polarity>,
    /// The header that the controller would use for GoodCRC.
    pub message_header: Option<(PowerRole, DataRole, SpecificationRevision)>,
    /// Whether reception is enabled.
    pub rx_enabled: bool,
    /// The VBUS source state.
    pub vbus_source: VbusSource,
    /// Whether sinking from VBUS is enabled.
    pub vbus_sink: bool,
    /// Whether VBUS is present. Otherwise, it is at vSafe0V.
    pub vbus_present: bool,
    /// Whether VBUS stays at its level, whatever the supplies do.
    pub vbus_stuck: bool,
    /// Whether VCONN is sourced.
    pub vconn: bool,
    /// Whether fast role swap detection is armed.
    pub frs_enabled: bool,
    /// The number of transmitted BIST carriers.
    pub bist_carriers: usize,
    /// Whether BIST test data mode is active.
    pub bist_test_mode: bool,
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyDriver {
    /// Create a new dummy driver, attached to a source that advertises SinkTxOk.
    pub fn new() -> Self {
        Self {
            rx_queue: VecDeque::new(),
            tx_queue: VecDeque::new(),
            failed_transmissions: 0,
            hard_resets: 0,
            cc_status: CcStatus {
                cc1: CcState::Rp3A0,
                cc2: CcState::Open,
                looking_for_connection: false,
            },
            cc_pull: CcPull::Open,
            rp_value: None,
            polarity: None,
            message_header: None,
            rx_enabled: false,
            vbus_source: VbusSource::Off,
            vbus_sink: false,
            vbus_present: true,
            vbus_stuck: false,
            vconn: false,
            frs_enabled: false,
            bist_carriers: 0,
            bist_test_mode: false,
        }
    }

    /// Inject a frame that was received on SOP.
    pub fn inject_received_data(&mut self, data: &[u8]) {
        self.inject_received_sop_data(Sop::Sop, data);
    }

    /// Inject a frame that was received on a given SOP.
    pub fn inject_received_sop_data(&mut self, sop: Sop, data: &[u8]) {
        let mut vec = heapless::Vec::new();
        vec.extend_from_slice(data).unwrap();

        self.rx_queue.push_back(Ok((sop, vec)));
    }

    /// Inject a receive error, such as a hard reset.
    pub fn inject_rx_error(&mut self, error: DriverRxError) {
        self.rx_queue.push_back(Err(error));
    }

    /// Let the next transmissions fail, as if no GoodCRC was received.
    pub fn fail_transmissions(&mut self, count: usize) {
        self.failed_transmissions = count;
    }

    /// Probe data that was transmitted by the stack.
    pub fn probe_transmitted_data(&mut self) -> heapless::Vec<u8, MAX_FRAME> {
        self.probe_transmission().data
    }

    /// Probe a transmission of the stack, with its SOP and retry count.
    pub fn probe_transmission(&mut self) -> Transmission {
        self.tx_queue.pop_front().expect("no transmitted data")
    }

    /// Whether transmitted data is waiting to be probed.
    pub fn has_transmitted_data(&self) -> bool {
        !self.tx_queue.is_empty()
    }

    /// Drain all transmissions.
    pub fn transmissions(&mut self) -> Vec<Transmission> {
        self.tx_queue.drain(..).collect()
    }
}

impl Driver for DummyDriver {
    const HAS_AUTO_GOOD_CRC: bool = true;
    const HAS_AUTO_RETRY: bool = true;

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(Sop, usize), DriverRxError> {
        let Some(first) = self.rx_queue.pop_front() else {
            return pending().await;
        };

        let (sop, frame) = first?;
        buffer[..frame.len()].copy_from_slice(&frame);

        Ok((sop, frame.len()))
    }

    async fn transmit(&mut self, sop: Sop, data: &[u8], retries: u8) -> Result<(), DriverTxError> {
        let mut vec = heapless::Vec::new();
        vec.extend_from_slice(data).unwrap();
        self.tx_queue.push_back(Transmission { sop, data: vec, retries });

        if self.failed_transmissions > 0 {
            self.failed_transmissions -= 1;
            return Err(DriverTxError::Failed);
        }

        Ok(())
    }

    async fn transmit_hard_reset(&mut self) -> Result<(), DriverTxError> {
        self.hard_resets += 1;
        Ok(())
    }
}

impl PortController for DummyDriver {
    async fn init(&mut self) -> Result<(), ControlError> {
        Ok(())
    }

    async fn set_cc(&mut self, pull: CcPull) -> Result<(), ControlError> {
        self.cc_pull = pull;
        Ok(())
    }

    async fn set_rp_value(&mut self, value: RpValue) -> Result<(), ControlError> {
        self.rp_value = Some(value);
        Ok(())
    }

    async fn cc_status(&mut self) -> Result<CcStatus, ControlError> {
        Ok(self.cc_status)
    }

    async fn look_for_connection(&mut self) -> Result<(), ControlError> {
        Ok(())
    }

    async fn wait_for_cc_change(&mut self) -> Result<CcStatus, ControlError> {
        pending().await
    }

    async fn set_polarity(&mut self, polarity: Polarity) -> Result<(), ControlError> {
        self.polarity = Some(polarity);
        Ok(())
    }

    async fn set_message_header(
        &mut self,
        power_role: PowerRole,
        data_role: DataRole,
        revision: SpecificationRevision,
    ) -> Result<(), ControlError> {
        self.message_header = Some((power_role, data_role, revision));
        Ok(())
    }

    async fn set_rx_enable(&mut self, enable: bool) -> Result<(), ControlError> {
        self.rx_enabled = enable;
        Ok(())
    }

    async fn set_vbus_source(&mut self, source: VbusSource) -> Result<(), ControlError> {
        self.vbus_source = source;
        Ok(())
    }

    async fn set_vbus_sink(&mut self, enable: bool) -> Result<(), ControlError> {
        self.vbus_sink = enable;
        Ok(())
    }

    async fn set_vconn(&mut self, enable: bool) -> Result<(), ControlError> {
        self.vconn = enable;
        Ok(())
    }

    async fn is_vbus_level(&mut self, level: VbusLevel) -> Result<bool, ControlError> {
        Ok(match level {
            VbusLevel::Present => self.vbus_present,
            VbusLevel::Safe0V => !self.vbus_present,
        })
    }

    async fn wait_for_vbus(&mut self, level: VbusLevel) -> Result<(), ControlError> {
        if self.vbus_stuck && self.vbus_present != (level == VbusLevel::Present) {
            core::future::pending::<()>().await;
        }

        // The supply follows every request immediately.
        self.vbus_present = level == VbusLevel::Present;
        Ok(())
    }

    async fn set_frs_enable(&mut self, enable: bool) -> Result<(), ControlError> {
        self.frs_enabled = enable;
        Ok(())
    }

    async fn transmit_bist_carrier(&mut self) -> Result<(), ControlError> {
        self.bist_carriers += 1;
        Ok(())
    }

    async fn set_bist_test_mode(&mut self, enable: bool) -> Result<(), ControlError> {
        self.bist_test_mode = enable;
        Ok(())
    }
}

/// A dummy device that implements the device policy manager for both power roles.
pub struct DummyDevice {
    /// Answer to DR_Swap.
    pub dr_swap: Response,
    /// Answer to PR_Swap.
    pub pr_swap: Response,
    /// Answer to VCONN_Swap.
    pub vconn_swap: Response,
    /// Events that are handed to the policy engine, one per call of `get_event`.
    pub events: VecDeque<Event>,
    /// Power levels that the device transitioned to, as a sink or as a source.
    pub transitions: Vec<PowerSource>,
    /// The number of hard resets that the device observed.
    pub hard_resets: usize,
    /// Alerts of the port partner.
    pub alerts: Vec<AlertDataObject>,
    /// Source capabilities of the port partner.
    pub partner_source_capabilities: Option<SourceCapabilities>,
    /// Country codes to report.
    pub country_codes: Option<CountryCodes>,
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self {
            dr_swap: Response::Accept,
            pr_swap: Response::Accept,
            vconn_swap: Response::Accept,
            events: VecDeque::new(),
            transitions: Vec::new(),
            hard_resets: 0,
            alerts: Vec::new(),
            partner_source_capabilities: None,
            country_codes: None,
        }
    }
}

impl DevicePolicyManager for DummyDevice {
    async fn transition_supply(&mut self, accepted: &PowerSource) {
        self.transitions.push(*accepted);
    }

    async fn transition_power(&mut self, accepted: &PowerSource) {
        self.transitions.push(*accepted);
    }

    async fn inform_source_capabilities(&mut self, source_capabilities: &SourceCapabilities) {
        self.partner_source_capabilities = Some(source_capabilities.clone());
    }

    async fn hard_reset(&mut self) {
        self.hard_resets += 1;
    }

    async fn evaluate_dr_swap(&mut self) -> Response {
        self.dr_swap
    }

    async fn evaluate_pr_swap(&mut self) -> Response {
        self.pr_swap
    }

    async fn evaluate_vconn_swap(&mut self) -> Response {
        self.vconn_swap
    }

    async fn alert(&mut self, alert: AlertDataObject) {
        self.alerts.push(alert);
    }

    fn identity(&self) -> Option<Identity> {
        Some(Identity {
            id_header: IdHeader(0).with_usb_device(true).with_product_type_ufp(0b010).with_vid(0x18D1),
            cert_stat: 0,
            product: ProductVdo(0).with_pid(0x5000).with_bcd_device(0x0100),
            product_type_vdos: heapless::Vec::new(),
        })
    }

    fn country_codes(&self) -> Option<CountryCodes> {
        self.country_codes.clone()
    }

    async fn get_event(&mut self, _port: &PortState) -> Event {
        match self.events.pop_front() {
            Some(event) => event,
            None => pending().await,
        }
    }
}

/// Dummy capabilities to deserialize.
///
/// - Fixed 5 V at 3 A
/// - Variable 3-5 V at 3 A
/// - PPS 1-5 V at 3 A
pub const DUMMY_CAPABILITIES: [u8; 14] = [
    0xA1, // Header
    0x31, // Header
    0x2C, // +
    0x91, // | Fixed 5V @ 3A
    0x01, // |
    0x00, // +
    0x2C, // +
    0xF1, // | Variable 3-5V @ 3A
    0x40, // |
    0x86, // +
    0x3C, // +
    0x0A, // | PPS 1-5V @ 3A
    0x64, // |
    0xC0, // +
];

/// Get dummy source capabilities for testing.
///
/// Corresponds to the `DUMMY_CAPABILITIES` above.
pub fn get_dummy_source_capabilities() -> SourceCapabilities {
    let message = Message::from_bytes(&DUMMY_CAPABILITIES).unwrap();

    match message.data() {
        Some(crate::protocol_layer::message::data::Data::SourceCapabilities(caps)) => caps.clone(),
        _ => unreachable!(),
    }
}
