//! A simulated TCPCI port controller.
//!
//! The register file sits behind an [`I2c`] implementation, and the alert line behind [`Wait`]. Both share
//! one [`Model`], which the test controls through a [`TcpcHandle`].
use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::poll_fn;
use std::rc::Rc;
use std::task::{Poll, Waker};
use std::vec::Vec;

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{I2c, Operation};

use super::clock;
use crate::Sop;
use crate::protocol_layer::message::header::{Header, MessageType};
use crate::tcpci::registers::{
    Alert, CcStatusRegister, Command, ExtendedStatus, FrameType, PowerStatus, ReceiveDetect, RoleControl, Transmit,
    address,
};
use crate::tcpci::{DEFAULT_ADDRESS, Tcpci};

pub const VENDOR_ID: u16 = 0x18D1;
pub const PRODUCT_ID: u16 = 0x5036;
pub const BCD_DEV: u16 = 0x0100;
pub const PD_REV: u16 = 0x3011;

/// A frame on the wire.
pub type Frame = Vec<u8>;

/// Something the partner or the supply does at a scheduled time.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A message from the partner.
    Receive(Sop, Frame),
    /// Hard reset signaling from the partner.
    HardReset,
    /// The partner drives VBUS, or stops driving it.
    PartnerVbus(bool),
    /// The CC status register changes.
    CcStatus(CcStatusRegister),
}

/// A transmission of the port controller, with the time it started.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub at: u64,
    pub frame_type: FrameType,
    pub retries: u8,
    pub data: Frame,
}

impl Transmission {
    /// The message type of a SOP frame.
    pub fn message_type(&self) -> Option<MessageType> {
        match self.frame_type {
            FrameType::Sop(_) => Header::from_bytes(&self.data).ok().map(|header| header.message_type()),
            _ => None,
        }
    }
}

/// Replies that follow a transmission of a certain message type.
struct Reply {
    trigger: MessageType,
    actions: Vec<(u64, Action)>,
}

/// The state of the simulated controller.
pub struct Model {
    registers: [u8; 256],
    alert: u16,
    alert_extended: u8,
    pointer: u8,
    rx_queue: VecDeque<(Sop, Frame)>,
    tx_buffer: Frame,
    partner_vbus: bool,
    sourcing_vbus: bool,
    withheld_good_crcs: usize,
    scheduled: Vec<(u64, Action)>,
    replies: VecDeque<Reply>,
    log: Vec<Transmission>,
    commands: Vec<Command>,
    waker: Option<Waker>,
}

impl Model {
    fn new() -> Self {
        let mut registers = [0u8; 256];
        for (register, value) in [
            (address::VENDOR_ID, VENDOR_ID),
            (address::PRODUCT_ID, PRODUCT_ID),
            (address::BCD_DEV, BCD_DEV),
            (address::PD_REV, PD_REV),
            // All alerts are unmasked after reset.
            (address::ALERT_MASK, 0x7FFF),
        ] {
            let [low, high] = value.to_le_bytes();
            registers[register as usize] = low;
            registers[register as usize + 1] = high;
        }

        Self {
            registers,
            alert: 0,
            alert_extended: 0,
            pointer: 0,
            rx_queue: VecDeque::new(),
            tx_buffer: Vec::new(),
            partner_vbus: false,
            sourcing_vbus: false,
            withheld_good_crcs: 0,
            scheduled: Vec::new(),
            replies: VecDeque::new(),
            log: Vec::new(),
            commands: Vec::new(),
            waker: None,
        }
    }

    fn vbus_present(&self) -> bool {
        self.partner_vbus || self.sourcing_vbus
    }

    fn alert_mask(&self) -> u16 {
        u16::from_le_bytes([
            self.registers[address::ALERT_MASK as usize],
            self.registers[address::ALERT_MASK as usize + 1],
        ])
    }

    fn receive_detect(&self) -> ReceiveDetect {
        ReceiveDetect(self.registers[address::RECEIVE_DETECT as usize])
    }

    fn assert(&mut self, alert: Alert) {
        self.alert |= alert.0;
        if self.alert & self.alert_mask() != 0 {
            if let Some(waker) = self.waker.take() {
                waker.wake();
            }
        }
    }

    fn set_vbus(&mut self, update: impl FnOnce(&mut Self)) {
        let before = self.vbus_present();
        update(self);

        if self.vbus_present() != before {
            self.assert(Alert(0).with_power_status(true).with_extended_status(true));
        }
    }

    fn schedule(&mut self, at: u64, action: Action) {
        clock::schedule(at);

        // Keep the order of scheduling among actions at the same time.
        let index = self.scheduled.partition_point(|&(other, _)| other <= at);
        self.scheduled.insert(index, (at, action));
    }

    /// Apply all actions that are due.
    fn update(&mut self) {
        let now = clock::now();

        while self.scheduled.first().is_some_and(|&(at, _)| at <= now) {
            let (at, action) = self.scheduled.remove(0);
            clock::unschedule(at);
            self.apply(action);
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Receive(sop, frame) => {
                let detect = self.receive_detect();
                let enabled = match sop {
                    Sop::Sop => detect.sop(),
                    Sop::SopPrime => detect.sop_prime(),
                    Sop::SopDoublePrime => detect.sop_double_prime(),
                    _ => false,
                };

                if enabled {
                    self.rx_queue.push_back((sop, frame));
                    self.assert(Alert(0).with_rx_status(true));
                }
            }
            Action::HardReset => {
                if self.receive_detect().hard_reset() {
                    self.rx_queue.clear();
                    self.assert(Alert(0).with_rx_hard_reset(true));
                }
            }
            Action::PartnerVbus(present) => self.set_vbus(|model| model.partner_vbus = present),
            Action::CcStatus(status) => {
                self.registers[address::CC_STATUS as usize] = status.0;
                self.assert(Alert(0).with_cc_status(true));
            }
        }
    }

    fn power_status(&self) -> PowerStatus {
        PowerStatus(0)
            .with_vbus_detection_enabled(true)
            .with_vbus_present(self.vbus_present())
            .with_sourcing_vbus(self.sourcing_vbus)
    }

    fn read(&mut self, buf: &mut [u8]) {
        let register = self.pointer;

        match register {
            address::ALERT => buf.copy_from_slice(&self.alert.to_le_bytes()[..buf.len()]),
            address::ALERT_EXTENDED => buf[0] = self.alert_extended,
            address::POWER_STATUS => buf[0] = self.power_status().0,
            address::EXTENDED_STATUS => buf[0] = ExtendedStatus(0).with_vsafe0v(!self.vbus_present()).0,
            address::RX_BUFFER => {
                buf.fill(0);
                if let Some((sop, frame)) = self.rx_queue.front() {
                    let mut raw = Vec::with_capacity(frame.len() + 2);
                    raw.push(frame.len() as u8 + 1);
                    raw.push(FrameType::Sop(*sop).into());
                    raw.extend_from_slice(frame);

                    let len = buf.len().min(raw.len());
                    buf[..len].copy_from_slice(&raw[..len]);
                }
            }
            _ => {
                let start = register as usize;
                let end = (start + buf.len()).min(self.registers.len());
                buf[..end - start].copy_from_slice(&self.registers[start..end]);
            }
        }
    }

    fn write(&mut self, data: &[u8]) {
        let register = self.pointer;

        match register {
            address::ALERT => {
                let mut raw = [0u8; 2];
                raw[..data.len().min(2)].copy_from_slice(&data[..data.len().min(2)]);
                let cleared = u16::from_le_bytes(raw);

                // Releasing the receive buffer exposes the next frame.
                if Alert(cleared).rx_status() && self.alert & Alert(0).with_rx_status(true).0 != 0 {
                    self.rx_queue.pop_front();
                }

                self.alert &= !cleared;
                if !self.rx_queue.is_empty() {
                    self.assert(Alert(0).with_rx_status(true));
                }
            }
            address::ALERT_EXTENDED => self.alert_extended &= !data[0],
            address::COMMAND => self.command(data[0]),
            address::TX_BUFFER => {
                let count = data[0] as usize;
                assert!(count <= 30, "TX_BUFFER byte count {} exceeds 30", count);
                assert_eq!(count + 1, data.len(), "TX_BUFFER byte count does not match the write");
                self.tx_buffer = data[1..].to_vec();
            }
            address::TRANSMIT => self.transmit(Transmit(data[0])),
            _ => {
                let start = register as usize;
                self.registers[start..start + data.len()].copy_from_slice(data);
            }
        }
    }

    fn command(&mut self, raw: u8) {
        let command = [
            Command::WakeI2c,
            Command::DisableVbusDetect,
            Command::EnableVbusDetect,
            Command::DisableSinkVbus,
            Command::SinkVbus,
            Command::DisableSourceVbus,
            Command::SourceVbusDefaultVoltage,
            Command::SourceVbusNondefaultVoltage,
            Command::LookForConnection,
            Command::RxOneMore,
            Command::SendFrSwapSignal,
            Command::ResetTransmitBuffer,
            Command::ResetReceiveBuffer,
            Command::I2cIdle,
        ]
        .into_iter()
        .find(|command| *command as u8 == raw);

        let Some(command) = command else {
            panic!("Unknown TCPC command {:#04x}", raw);
        };

        match command {
            Command::SourceVbusDefaultVoltage | Command::SourceVbusNondefaultVoltage => {
                self.set_vbus(|model| model.sourcing_vbus = true)
            }
            Command::DisableSourceVbus => self.set_vbus(|model| model.sourcing_vbus = false),
            Command::LookForConnection => {
                let role_control = RoleControl(self.registers[address::ROLE_CONTROL as usize]);
                assert!(role_control.drp(), "Look for connection without DRP");
            }
            _ => (),
        }

        self.commands.push(command);
    }

    fn transmit(&mut self, transmit: Transmit) {
        let frame_type = transmit.frame_type();
        let retries = transmit.retry_counter();
        let now = clock::now();

        let data = match frame_type {
            FrameType::Sop(_) => {
                assert!(!self.tx_buffer.is_empty(), "TRANSMIT without a frame");
                core::mem::take(&mut self.tx_buffer)
            }
            _ => Vec::new(),
        };

        let transmission = Transmission {
            at: now,
            frame_type,
            retries,
            data,
        };
        let message_type = transmission.message_type();
        self.log.push(transmission);

        match frame_type {
            FrameType::Sop(_) if self.withheld_good_crcs > 0 => {
                self.withheld_good_crcs -= 1;
                self.assert(Alert(0).with_tx_failed(true));
            }
            FrameType::Sop(_) => {
                self.assert(Alert(0).with_tx_success(true));

                let reply = self
                    .replies
                    .front()
                    .is_some_and(|reply| Some(reply.trigger) == message_type);
                if let Some(reply) = reply.then(|| self.replies.pop_front()).flatten() {
                    for (delay, action) in reply.actions {
                        self.schedule(now + delay, action);
                    }
                }
            }
            FrameType::HardReset => {
                self.rx_queue.clear();
                self.assert(Alert(0).with_tx_success(true).with_tx_failed(true));
            }
            FrameType::CableReset | FrameType::BistCarrierMode2 => self.assert(Alert(0).with_tx_success(true)),
        }
    }
}

/// The I2C side of the controller.
pub struct MockTcpc {
    model: Rc<RefCell<Model>>,
}

impl embedded_hal_async::i2c::ErrorType for MockTcpc {
    type Error = Infallible;
}

impl I2c for MockTcpc {
    async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        assert_eq!(address, DEFAULT_ADDRESS, "Access to an unknown I2C address");

        let mut model = self.model.borrow_mut();
        model.update();

        for operation in operations {
            match operation {
                Operation::Write(data) => {
                    let Some((&register, rest)) = data.split_first() else {
                        continue;
                    };

                    model.pointer = register;
                    if !rest.is_empty() {
                        model.write(rest);
                    }
                }
                Operation::Read(buf) => model.read(buf),
            }
        }

        Ok(())
    }
}

/// The alert line of the controller, which is low while an unmasked alert is set.
pub struct AlertLine {
    model: Rc<RefCell<Model>>,
}

impl AlertLine {
    async fn wait_for(&mut self, asserted: bool) -> Result<(), Infallible> {
        poll_fn(|cx| {
            let mut model = self.model.borrow_mut();
            model.update();

            if (model.alert & model.alert_mask() != 0) == asserted {
                Poll::Ready(Ok(()))
            } else {
                model.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        })
        .await
    }
}

impl embedded_hal::digital::ErrorType for AlertLine {
    type Error = Infallible;
}

impl Wait for AlertLine {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        self.wait_for(false).await
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.wait_for(true).await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for(false).await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for(true).await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for(true).await
    }
}

/// Test access to the simulated controller.
#[derive(Clone)]
pub struct TcpcHandle {
    model: Rc<RefCell<Model>>,
}

impl TcpcHandle {
    /// Create a controller, and the driver that talks to it.
    pub fn new() -> (Self, Tcpci<MockTcpc, AlertLine>) {
        let model = Rc::new(RefCell::new(Model::new()));
        let i2c = MockTcpc { model: model.clone() };
        let alert = AlertLine { model: model.clone() };

        (Self { model }, Tcpci::new(i2c, alert, DEFAULT_ADDRESS))
    }

    /// Run an action after `delay` milliseconds.
    pub fn schedule(&self, delay: u64, action: Action) {
        self.model.borrow_mut().schedule(clock::now() + delay, action);
    }

    /// Deliver a frame from the partner after `delay` milliseconds.
    pub fn deliver(&self, delay: u64, frame: Frame) {
        self.schedule(delay, Action::Receive(Sop::Sop, frame));
    }

    /// Once the port transmits a message of type `trigger`, run `actions` after their delays.
    ///
    /// Replies are matched in the order of their registration.
    pub fn reply_to(&self, trigger: MessageType, actions: Vec<(u64, Action)>) {
        self.model.borrow_mut().replies.push_back(Reply { trigger, actions });
    }

    /// Whether registered replies were not triggered yet.
    pub fn has_pending_replies(&self) -> bool {
        !self.model.borrow().replies.is_empty()
    }

    /// Fail the next `count` transmissions, as if no GoodCRC arrived.
    pub fn withhold_good_crc(&self, count: usize) {
        self.model.borrow_mut().withheld_good_crcs = count;
    }

    /// Set whether the partner drives VBUS, right away.
    pub fn set_partner_vbus(&self, present: bool) {
        self.model.borrow_mut().apply(Action::PartnerVbus(present));
    }

    /// Set the CC status register, right away.
    pub fn set_cc_status(&self, status: CcStatusRegister) {
        self.model.borrow_mut().apply(Action::CcStatus(status));
    }

    /// Whether VBUS is above vSafe5V.
    pub fn vbus_present(&self) -> bool {
        self.model.borrow().vbus_present()
    }

    /// The value of a register.
    pub fn register(&self, register: u8) -> u8 {
        self.model.borrow().registers[register as usize]
    }

    /// Drain the transmit log.
    pub fn transmissions(&self) -> Vec<Transmission> {
        core::mem::take(&mut self.model.borrow_mut().log)
    }

    /// The message types of drained SOP transmissions.
    pub fn transmitted_types(&self) -> Vec<MessageType> {
        self.transmissions()
            .iter()
            .filter_map(|transmission| transmission.message_type())
            .collect()
    }

    /// Drain the command log.
    pub fn commands(&self) -> Vec<Command> {
        core::mem::take(&mut self.model.borrow_mut().commands)
    }
}

#[cfg(test)]
mod tests {
    use tcpm_traits::{CcPull, Driver, PortController, RpValue, VbusLevel};

    use super::*;
    use crate::tcpci::registers::CcTermination;

    #[tokio::test]
    async fn test_register_file() {
        clock::reset();
        let (tcpc, mut tcpci) = TcpcHandle::new();

        tcpci.init().await.unwrap();
        assert_eq!(tcpc.register(address::ALERT_MASK), 0x7F);
        assert_eq!(tcpc.commands(), [Command::EnableVbusDetect]);

        tcpci.set_cc(CcPull::Drp(RpValue::Current1A5)).await.unwrap();
        let role_control = RoleControl(tcpc.register(address::ROLE_CONTROL));
        assert!(role_control.drp());
        assert_eq!(role_control.cc1(), CcTermination::Rd);

        assert!(tcpci.is_vbus_level(VbusLevel::Safe0V).await.unwrap());
        tcpci.set_vbus_source(tcpm_traits::VbusSource::Default).await.unwrap();
        assert!(tcpc.vbus_present());
    }

    #[tokio::test]
    async fn test_withheld_good_crc() {
        clock::reset();
        let (tcpc, mut tcpci) = TcpcHandle::new();

        tcpc.withhold_good_crc(1);
        assert_eq!(
            tcpci.transmit(Sop::Sop, &[0x41, 0x10], 2).await,
            Err(tcpm_traits::DriverTxError::Failed)
        );
        tcpci.transmit(Sop::Sop, &[0x41, 0x12], 2).await.unwrap();

        let transmissions = tcpc.transmissions();
        assert_eq!(transmissions.len(), 2);
        assert_eq!(transmissions[0].retries, 2);
        assert_eq!(transmissions[1].data, [0x41, 0x12]);
    }

    #[tokio::test]
    async fn test_scheduled_receive() {
        clock::reset();
        let (tcpc, mut tcpci) = TcpcHandle::new();
        tcpci.set_rx_enable(true).await.unwrap();

        tcpc.deliver(0, std::vec![0x41, 0x02]);
        let mut buffer = [0u8; 30];
        let (sop, len) = tcpci.receive(&mut buffer).await.unwrap();

        assert_eq!(sop, Sop::Sop);
        assert_eq!(&buffer[..len], &[0x41, 0x02]);
    }
}
