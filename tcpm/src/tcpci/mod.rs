//! Driver for port controllers that implement the USB Type-C Port Controller Interface (TCPCI).
//!
//! The controller is accessed over I2C, and signals events through an active-low alert line.
//! It handles GoodCRC replies and transmission retries in hardware.
pub mod registers;

use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::I2c;
use heapless::Vec;
use registers::{
    Alert, AlertExtended, CcStatusRegister, CcTermination, Command, ExtendedStatus, FrameType, MessageHeaderInfo,
    PowerControl, PowerStatus, ReceiveDetect, RoleControl, TcpcControl, Transmit, address,
};
use tcpm_traits::{
    CcPull, CcState, CcStatus, ControlError, DataRole, Driver, DriverRxError, DriverTxError, Polarity, PortController,
    PowerRole, RpValue, Sop, SpecificationRevision, VbusLevel, VbusSource,
};

/// The default 7-bit I2C address of a TCPC.
pub const DEFAULT_ADDRESS: u8 = 0x50;

/// The largest frame that fits the receive and transmit buffers.
const MAX_FRAME_LEN: usize = 30;

/// The maximum number of retries that the TRANSMIT register holds.
const MAX_HARDWARE_RETRIES: u8 = 3;

/// A TCPCI port controller.
pub struct Tcpci<I2C, ALERT> {
    i2c: I2C,
    alert: ALERT,
    address: u8,
    role_control: RoleControl,
    tcpc_control: TcpcControl,
    power_control: PowerControl,
    /// A message that arrived while another operation waited for alerts.
    pending_rx: Option<(Sop, Vec<u8, MAX_FRAME_LEN>)>,
}

impl<I2C: I2c, ALERT: Wait> Tcpci<I2C, ALERT> {
    /// Create a new driver for the controller at `address`.
    pub fn new(i2c: I2C, alert: ALERT, address: u8) -> Self {
        Self {
            i2c,
            alert,
            address,
            role_control: RoleControl(0).with_cc1(CcTermination::Open).with_cc2(CcTermination::Open),
            tcpc_control: TcpcControl(0),
            power_control: PowerControl(0),
            pending_rx: None,
        }
    }

    /// Release the bus and alert line.
    pub fn release(self) -> (I2C, ALERT) {
        (self.i2c, self.alert)
    }

    async fn read_u8(&mut self, register: u8) -> Result<u8, ControlError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut value)
            .await
            .map_err(|_| bus_error(register))?;

        Ok(value[0])
    }

    async fn read_u16(&mut self, register: u8) -> Result<u16, ControlError> {
        let mut value = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut value)
            .await
            .map_err(|_| bus_error(register))?;

        Ok(u16::from_le_bytes(value))
    }

    async fn write_u8(&mut self, register: u8, value: u8) -> Result<(), ControlError> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(|_| bus_error(register))
    }

    async fn write_u16(&mut self, register: u8, value: u16) -> Result<(), ControlError> {
        let [low, high] = value.to_le_bytes();
        self.i2c
            .write(self.address, &[register, low, high])
            .await
            .map_err(|_| bus_error(register))
    }

    async fn command(&mut self, command: Command) -> Result<(), ControlError> {
        trace!("TCPC command {:?}", command);
        self.write_u8(address::COMMAND, command as u8).await
    }

    async fn clear_alert(&mut self, alert: Alert) -> Result<(), ControlError> {
        if alert.0 == 0 {
            return Ok(());
        }

        self.write_u16(address::ALERT, alert.0).await
    }

    /// Wait until the controller reports an alert that the driver handles.
    ///
    /// Alerts that are not handled are cleared on the way.
    async fn wait_alert(&mut self) -> Result<Alert, ControlError> {
        loop {
            let alert = Alert(self.read_u16(address::ALERT).await?);
            let unhandled = Alert(alert.0 & !Alert::MASK.0);
            self.clear_alert(unhandled).await?;

            let handled = Alert(alert.0 & Alert::MASK.0);
            if handled.0 != 0 {
                return Ok(handled);
            }

            self.alert.wait_for_low().await.map_err(|_| {
                error!("Alert line failure");
                ControlError::Bus
            })?;
        }
    }

    /// Read a frame from the receive buffer and release the buffer.
    async fn read_rx_buffer(&mut self) -> Result<Option<(Sop, Vec<u8, MAX_FRAME_LEN>)>, ControlError> {
        let mut count = [0u8; 1];
        self.i2c
            .write_read(self.address, &[address::RX_BUFFER], &mut count)
            .await
            .map_err(|_| bus_error(address::RX_BUFFER))?;

        // The byte count includes the frame type.
        let count = count[0] as usize;
        let mut raw = [0u8; MAX_FRAME_LEN + 2];
        let total = (count + 1).min(raw.len());

        if count > 0 {
            self.i2c
                .write_read(self.address, &[address::RX_BUFFER], &mut raw[..total])
                .await
                .map_err(|_| bus_error(address::RX_BUFFER))?;
        }

        self.clear_alert(Alert(0).with_rx_status(true)).await?;

        if count < 1 {
            warn!("Empty receive buffer");
            return Ok(None);
        }

        match FrameType::from(raw[1]) {
            FrameType::Sop(sop) => {
                let frame = Vec::from_slice(&raw[2..total]).map_err(|_| ControlError::Bus)?;
                trace!("RX {:?}: {:?}", sop, frame.as_slice());
                Ok(Some((sop, frame)))
            }
            other => {
                warn!("Discard frame of type {:?}", other);
                Ok(None)
            }
        }
    }

    /// Keep a message that arrived while waiting for something else.
    async fn stash_rx(&mut self) -> Result<(), ControlError> {
        let frame = self.read_rx_buffer().await?;

        if self.pending_rx.is_some() {
            warn!("Drop received message, receiver busy");
        } else {
            self.pending_rx = frame;
        }

        Ok(())
    }

    /// Handle alerts that may occur during any wait, after the caller took what it needs.
    ///
    /// Returns an error for hard resets and detaches.
    async fn handle_common_alerts(&mut self, alert: Alert) -> Result<(), ControlError> {
        if alert.rx_hard_reset() {
            self.pending_rx = None;
            self.clear_alert(Alert(0).with_rx_hard_reset(true)).await?;
            return Err(ControlError::HardReset);
        }

        if alert.rx_status() {
            self.stash_rx().await?;
        }

        let remaining = Alert(alert.0 & !(Alert(0).with_rx_status(true).with_rx_hard_reset(true).0));
        self.clear_alert(remaining).await?;

        if alert.cc_status() && self.cc_status().await?.is_open() {
            return Err(ControlError::Disconnected);
        }

        Ok(())
    }

    async fn wait_transmit_complete(&mut self) -> Result<(), DriverTxError> {
        loop {
            let alert = self.wait_alert().await.map_err(tx_error)?;

            if alert.rx_hard_reset() {
                self.pending_rx = None;
                self.clear_alert(Alert(alert.0 & (Alert::TX_COMPLETE.0 | Alert(0).with_rx_hard_reset(true).0)))
                    .await
                    .map_err(tx_error)?;
                return Err(DriverTxError::HardReset);
            }

            // Messages that arrive during a transmission are passed up on the next receive.
            if alert.rx_status() {
                self.stash_rx().await.map_err(tx_error)?;
            }

            if alert.tx_success() || alert.tx_failed() || alert.tx_discarded() {
                self.clear_alert(Alert::TX_COMPLETE).await.map_err(tx_error)?;

                return if alert.tx_success() {
                    Ok(())
                } else if alert.tx_discarded() {
                    Err(DriverTxError::Discarded)
                } else {
                    Err(DriverTxError::Failed)
                };
            }

            let remaining = Alert(alert.0 & !Alert(0).with_rx_status(true).0);
            self.clear_alert(remaining).await.map_err(tx_error)?;

            if alert.cc_status() && self.cc_status().await.map_err(tx_error)?.is_open() {
                return Err(DriverTxError::Disconnected);
            }
        }
    }

    fn presents_rd(&self, status: CcStatusRegister) -> bool {
        if self.role_control.drp() {
            status.connect_result()
        } else {
            self.role_control.cc1() == CcTermination::Rd || self.role_control.cc2() == CcTermination::Rd
        }
    }
}

fn bus_error(register: u8) -> ControlError {
    error!("I2C failure on register {}", register);
    ControlError::Bus
}

fn rx_error(error: ControlError) -> DriverRxError {
    match error {
        ControlError::HardReset => DriverRxError::HardReset,
        ControlError::Disconnected => DriverRxError::Disconnected,
        ControlError::Bus => DriverRxError::Discarded,
    }
}

fn tx_error(error: ControlError) -> DriverTxError {
    match error {
        ControlError::HardReset => DriverTxError::HardReset,
        ControlError::Disconnected => DriverTxError::Disconnected,
        ControlError::Bus => DriverTxError::Failed,
    }
}

fn rp_bits(value: RpValue) -> u8 {
    match value {
        RpValue::Default => 0b00,
        RpValue::Current1A5 => 0b01,
        RpValue::Current3A0 => 0b10,
    }
}

/// Decode the state of a CC line, as seen by a port presenting Rd.
fn decode_as_sink(state: u8) -> CcState {
    match state {
        0b01 => CcState::RpDefault,
        0b10 => CcState::Rp1A5,
        0b11 => CcState::Rp3A0,
        _ => CcState::Open,
    }
}

/// Decode the state of a CC line, as seen by a port presenting Rp.
fn decode_as_source(state: u8) -> CcState {
    match state {
        0b01 => CcState::Ra,
        0b10 => CcState::Rd,
        _ => CcState::Open,
    }
}

impl<I2C: I2c, ALERT: Wait> Driver for Tcpci<I2C, ALERT> {
    const HAS_AUTO_GOOD_CRC: bool = true;
    const HAS_AUTO_RETRY: bool = true;

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<(Sop, usize), DriverRxError> {
        loop {
            if let Some((sop, frame)) = self.pending_rx.take() {
                let len = frame.len().min(buffer.len());
                buffer[..len].copy_from_slice(&frame[..len]);
                return Ok((sop, len));
            }

            let alert = self.wait_alert().await.map_err(rx_error)?;

            if alert.alert_extended() {
                let extended = AlertExtended(self.read_u8(address::ALERT_EXTENDED).await.map_err(rx_error)?);
                self.write_u8(address::ALERT_EXTENDED, extended.0).await.map_err(rx_error)?;
                self.clear_alert(Alert(0).with_alert_extended(true))
                    .await
                    .map_err(rx_error)?;

                if extended.sink_fast_role_swap() {
                    info!("Fast role swap signal");
                    return Err(DriverRxError::FastRoleSwap);
                }
            }

            if alert.rx_buffer_overflow() {
                warn!("Receive buffer overflow");
                self.clear_alert(Alert(0).with_rx_buffer_overflow(true).with_rx_status(true))
                    .await
                    .map_err(rx_error)?;
                return Err(DriverRxError::Discarded);
            }

            let other = Alert(alert.0 & !(Alert(0).with_alert_extended(true).with_rx_buffer_overflow(true).0));
            self.handle_common_alerts(other).await.map_err(rx_error)?;
        }
    }

    async fn transmit(&mut self, sop: Sop, data: &[u8], retries: u8) -> Result<(), DriverTxError> {
        if data.len() > MAX_FRAME_LEN {
            error!("Frame of {} bytes exceeds the transmit buffer", data.len());
            return Err(DriverTxError::Failed);
        }

        let mut buffer = [0u8; MAX_FRAME_LEN + 2];
        buffer[0] = address::TX_BUFFER;
        buffer[1] = data.len() as u8;
        buffer[2..2 + data.len()].copy_from_slice(data);

        trace!("TX {:?}: {:?}", sop, data);
        self.i2c
            .write(self.address, &buffer[..2 + data.len()])
            .await
            .map_err(|_| tx_error(bus_error(address::TX_BUFFER)))?;

        let transmit = Transmit(0)
            .with_retry_counter(retries.min(MAX_HARDWARE_RETRIES))
            .with_frame_type(FrameType::Sop(sop));
        self.write_u8(address::TRANSMIT, transmit.0).await.map_err(tx_error)?;

        self.wait_transmit_complete().await
    }

    async fn transmit_hard_reset(&mut self) -> Result<(), DriverTxError> {
        self.pending_rx = None;

        let transmit = Transmit(0).with_frame_type(FrameType::HardReset);
        self.write_u8(address::TRANSMIT, transmit.0).await.map_err(tx_error)?;

        loop {
            let alert = self.wait_alert().await.map_err(tx_error)?;
            self.clear_alert(alert).await.map_err(tx_error)?;

            // Controllers flag hard reset completion with both success and failure.
            if alert.tx_success() || alert.tx_failed() {
                return Ok(());
            }

            if alert.tx_discarded() {
                return Err(DriverTxError::Discarded);
            }
        }
    }
}

impl<I2C: I2c, ALERT: Wait> PortController for Tcpci<I2C, ALERT> {
    async fn init(&mut self) -> Result<(), ControlError> {
        loop {
            let power_status = PowerStatus(self.read_u8(address::POWER_STATUS).await?);
            if !power_status.uninitialized() {
                break;
            }

            trace!("Wait for TCPC initialization");
            let alert = self.wait_alert().await?;
            self.clear_alert(alert).await?;
        }

        self.pending_rx = None;
        self.clear_alert(Alert(0xFFFF)).await?;
        self.write_u16(address::ALERT_MASK, Alert::MASK.0).await?;
        self.write_u8(address::POWER_STATUS_MASK, PowerStatus(0).with_vbus_present(true).0)
            .await?;
        self.write_u8(address::EXTENDED_STATUS_MASK, ExtendedStatus(0).with_vsafe0v(true).0)
            .await?;
        self.write_u8(
            address::ALERT_EXTENDED_MASK,
            AlertExtended(0).with_sink_fast_role_swap(true).0,
        )
        .await?;
        self.command(Command::EnableVbusDetect).await?;

        let vendor = self.read_u16(address::VENDOR_ID).await?;
        let product = self.read_u16(address::PRODUCT_ID).await?;
        let device = self.read_u16(address::BCD_DEV).await?;
        let revision = self.read_u16(address::PD_REV).await?;
        info!("TCPC {:04x}:{:04x} device {:04x} PD revision {:04x}", vendor, product, device, revision);

        Ok(())
    }

    async fn set_cc(&mut self, pull: CcPull) -> Result<(), ControlError> {
        let role_control = match pull {
            CcPull::Open => RoleControl(0).with_cc1(CcTermination::Open).with_cc2(CcTermination::Open),
            CcPull::Rd => RoleControl(0).with_cc1(CcTermination::Rd).with_cc2(CcTermination::Rd),
            CcPull::Rp(value) => RoleControl(0)
                .with_rp_value(rp_bits(value))
                .with_cc1(CcTermination::Rp)
                .with_cc2(CcTermination::Rp),
            CcPull::Drp(value) => RoleControl(0)
                .with_drp(true)
                .with_rp_value(rp_bits(value))
                .with_cc1(CcTermination::Rd)
                .with_cc2(CcTermination::Rd),
        };

        debug!("Set CC {:?}", pull);
        self.write_u8(address::ROLE_CONTROL, role_control.0).await?;
        self.role_control = role_control;
        Ok(())
    }

    async fn set_rp_value(&mut self, value: RpValue) -> Result<(), ControlError> {
        let role_control = self.role_control.with_rp_value(rp_bits(value));
        self.write_u8(address::ROLE_CONTROL, role_control.0).await?;
        self.role_control = role_control;
        Ok(())
    }

    async fn cc_status(&mut self) -> Result<CcStatus, ControlError> {
        let status = CcStatusRegister(self.read_u8(address::CC_STATUS).await?);

        if status.looking_for_connection() {
            return Ok(CcStatus {
                looking_for_connection: true,
                ..CcStatus::OPEN
            });
        }

        let decode = if self.presents_rd(status) {
            decode_as_sink
        } else {
            decode_as_source
        };

        Ok(CcStatus {
            cc1: decode(status.cc1_state()),
            cc2: decode(status.cc2_state()),
            looking_for_connection: false,
        })
    }

    async fn look_for_connection(&mut self) -> Result<(), ControlError> {
        let tcpc_control = self.tcpc_control.with_enable_looking_for_connection_alert(true);
        self.write_u8(address::TCPC_CONTROL, tcpc_control.0).await?;
        self.tcpc_control = tcpc_control;

        self.command(Command::LookForConnection).await
    }

    async fn wait_for_cc_change(&mut self) -> Result<CcStatus, ControlError> {
        loop {
            let alert = self.wait_alert().await?;
            self.clear_alert(alert).await?;

            if alert.cc_status() {
                return self.cc_status().await;
            }
        }
    }

    async fn set_polarity(&mut self, polarity: Polarity) -> Result<(), ControlError> {
        let tcpc_control = self.tcpc_control.with_plug_orientation(polarity == Polarity::Cc2);
        self.write_u8(address::TCPC_CONTROL, tcpc_control.0).await?;
        self.tcpc_control = tcpc_control;
        Ok(())
    }

    async fn set_message_header(
        &mut self,
        power_role: PowerRole,
        data_role: DataRole,
        revision: SpecificationRevision,
    ) -> Result<(), ControlError> {
        let info = MessageHeaderInfo(0)
            .with_power_role(power_role.into())
            .with_data_role(data_role.into())
            .with_revision(revision.into());

        self.write_u8(address::MESSAGE_HEADER_INFO, info.0).await
    }

    async fn set_rx_enable(&mut self, enable: bool) -> Result<(), ControlError> {
        let detect = if enable {
            ReceiveDetect(0)
                .with_sop(true)
                .with_sop_prime(true)
                .with_sop_double_prime(true)
                .with_hard_reset(true)
        } else {
            self.pending_rx = None;
            ReceiveDetect(0)
        };

        self.write_u8(address::RECEIVE_DETECT, detect.0).await
    }

    async fn set_vbus_source(&mut self, source: VbusSource) -> Result<(), ControlError> {
        let command = match source {
            VbusSource::Off => Command::DisableSourceVbus,
            VbusSource::Default => Command::SourceVbusDefaultVoltage,
            VbusSource::NonDefault => Command::SourceVbusNondefaultVoltage,
        };

        self.command(command).await
    }

    async fn set_vbus_sink(&mut self, enable: bool) -> Result<(), ControlError> {
        self.command(if enable {
            Command::SinkVbus
        } else {
            Command::DisableSinkVbus
        })
        .await
    }

    async fn set_vconn(&mut self, enable: bool) -> Result<(), ControlError> {
        let power_control = self.power_control.with_enable_vconn(enable);
        self.write_u8(address::POWER_CONTROL, power_control.0).await?;
        self.power_control = power_control;
        Ok(())
    }

    async fn is_vbus_level(&mut self, level: VbusLevel) -> Result<bool, ControlError> {
        match level {
            VbusLevel::Safe0V => Ok(ExtendedStatus(self.read_u8(address::EXTENDED_STATUS).await?).vsafe0v()),
            VbusLevel::Present => Ok(PowerStatus(self.read_u8(address::POWER_STATUS).await?).vbus_present()),
        }
    }

    async fn wait_for_vbus(&mut self, level: VbusLevel) -> Result<(), ControlError> {
        loop {
            if self.is_vbus_level(level).await? {
                return Ok(());
            }

            let alert = self.wait_alert().await?;
            self.handle_common_alerts(alert).await?;
        }
    }

    async fn set_frs_enable(&mut self, enable: bool) -> Result<(), ControlError> {
        let power_control = self.power_control.with_fast_role_swap_enable(enable);
        self.write_u8(address::POWER_CONTROL, power_control.0).await?;
        self.power_control = power_control;
        Ok(())
    }

    async fn transmit_bist_carrier(&mut self) -> Result<(), ControlError> {
        let transmit = Transmit(0).with_frame_type(FrameType::BistCarrierMode2);
        self.write_u8(address::TRANSMIT, transmit.0).await?;

        loop {
            let alert = self.wait_alert().await?;
            self.clear_alert(Alert(alert.0 & Alert::TX_COMPLETE.0)).await?;

            if alert.tx_success() || alert.tx_failed() || alert.tx_discarded() {
                return Ok(());
            }

            self.handle_common_alerts(Alert(alert.0 & !Alert::TX_COMPLETE.0)).await?;
        }
    }

    async fn set_bist_test_mode(&mut self, enable: bool) -> Result<(), ControlError> {
        let tcpc_control = self.tcpc_control.with_bist_test_mode(enable);
        self.write_u8(address::TCPC_CONTROL, tcpc_control.0).await?;
        self.tcpc_control = tcpc_control;
        Ok(())
    }
}
