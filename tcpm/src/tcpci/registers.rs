//! Register map of a TCPCI compliant port controller.
use proc_bitfield::bitfield;

use crate::Sop;

/// Register addresses.
pub mod address {
    pub const VENDOR_ID: u8 = 0x00;
    pub const PRODUCT_ID: u8 = 0x02;
    pub const BCD_DEV: u8 = 0x04;
    pub const TC_REV: u8 = 0x06;
    pub const PD_REV: u8 = 0x08;
    pub const PD_INT_REV: u8 = 0x0A;
    pub const ALERT: u8 = 0x10;
    pub const ALERT_MASK: u8 = 0x12;
    pub const POWER_STATUS_MASK: u8 = 0x14;
    pub const FAULT_STATUS_MASK: u8 = 0x15;
    pub const EXTENDED_STATUS_MASK: u8 = 0x16;
    pub const ALERT_EXTENDED_MASK: u8 = 0x17;
    pub const CONFIG_STANDARD_OUTPUT: u8 = 0x18;
    pub const TCPC_CONTROL: u8 = 0x19;
    pub const ROLE_CONTROL: u8 = 0x1A;
    pub const FAULT_CONTROL: u8 = 0x1B;
    pub const POWER_CONTROL: u8 = 0x1C;
    pub const CC_STATUS: u8 = 0x1D;
    pub const POWER_STATUS: u8 = 0x1E;
    pub const FAULT_STATUS: u8 = 0x1F;
    pub const EXTENDED_STATUS: u8 = 0x20;
    pub const ALERT_EXTENDED: u8 = 0x21;
    pub const COMMAND: u8 = 0x23;
    pub const DEVICE_CAPABILITIES_1: u8 = 0x24;
    pub const MESSAGE_HEADER_INFO: u8 = 0x2E;
    pub const RECEIVE_DETECT: u8 = 0x2F;
    pub const RX_BUFFER: u8 = 0x30;
    pub const TRANSMIT: u8 = 0x50;
    pub const TX_BUFFER: u8 = 0x51;
    pub const VBUS_VOLTAGE: u8 = 0x70;
}

bitfield! {
    /// Alert register, where bits are cleared by writing ones.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Alert(pub u16): Debug, FromStorage, IntoStorage {
        pub vendor_defined: bool @ 15,
        pub alert_extended: bool @ 14,
        pub extended_status: bool @ 13,
        pub beginning_sop_message: bool @ 12,
        pub vbus_sink_disconnect: bool @ 11,
        pub rx_buffer_overflow: bool @ 10,
        pub fault: bool @ 9,
        pub vbus_alarm_lo: bool @ 8,
        pub vbus_alarm_hi: bool @ 7,
        pub tx_success: bool @ 6,
        pub tx_discarded: bool @ 5,
        pub tx_failed: bool @ 4,
        pub rx_hard_reset: bool @ 3,
        pub rx_status: bool @ 2,
        pub power_status: bool @ 1,
        pub cc_status: bool @ 0,
    }
}

impl Alert {
    /// All transmission result bits.
    pub const TX_COMPLETE: Self = Self(0x0070);

    /// The alerts that the driver handles.
    pub const MASK: Self = Self(0x7C7F);
}

bitfield! {
    /// Extended alert register, where bits are cleared by writing ones.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct AlertExtended(pub u8): Debug, FromStorage, IntoStorage {
        pub timer_expired: bool @ 2,
        pub source_fast_role_swap: bool @ 1,
        pub sink_fast_role_swap: bool @ 0,
    }
}

/// Termination of a single CC line in the role control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcTermination {
    Ra,
    Rp,
    Rd,
    Open,
}

impl From<u8> for CcTermination {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::Ra,
            0b01 => Self::Rp,
            0b10 => Self::Rd,
            _ => Self::Open,
        }
    }
}

impl From<CcTermination> for u8 {
    fn from(value: CcTermination) -> Self {
        match value {
            CcTermination::Ra => 0b00,
            CcTermination::Rp => 0b01,
            CcTermination::Rd => 0b10,
            CcTermination::Open => 0b11,
        }
    }
}

bitfield! {
    /// Role control register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct RoleControl(pub u8): Debug, FromStorage, IntoStorage {
        pub drp: bool @ 6,
        /// 0b00: default, 0b01: 1.5 A, 0b10: 3.0 A
        pub rp_value: u8 @ 4..=5,
        pub cc2: u8 [CcTermination] @ 2..=3,
        pub cc1: u8 [CcTermination] @ 0..=1,
    }
}

bitfield! {
    /// CC status register.
    ///
    /// Line states read as Open/Ra/Rd when presenting Rp, and as Open/Default/1.5 A/3.0 A when presenting Rd.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CcStatusRegister(pub u8): Debug, FromStorage, IntoStorage {
        pub looking_for_connection: bool @ 5,
        /// Set when the resolved termination is Rd.
        pub connect_result: bool @ 4,
        pub cc2_state: u8 @ 2..=3,
        pub cc1_state: u8 @ 0..=1,
    }
}

bitfield! {
    /// TCPC control register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TcpcControl(pub u8): Debug, FromStorage, IntoStorage {
        pub enable_looking_for_connection_alert: bool @ 6,
        pub bist_test_mode: bool @ 1,
        /// Set when communication happens on CC2.
        pub plug_orientation: bool @ 0,
    }
}

bitfield! {
    /// Power control register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PowerControl(pub u8): Debug, FromStorage, IntoStorage {
        pub fast_role_swap_enable: bool @ 7,
        pub disable_vbus_voltage_monitor: bool @ 6,
        pub disable_voltage_alarms: bool @ 5,
        pub auto_discharge_disconnect: bool @ 4,
        pub enable_bleed_discharge: bool @ 3,
        pub force_discharge: bool @ 2,
        pub vconn_power_supported: bool @ 1,
        pub enable_vconn: bool @ 0,
    }
}

bitfield! {
    /// Power status register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PowerStatus(pub u8): Debug, FromStorage, IntoStorage {
        pub debug_accessory_connected: bool @ 7,
        /// Set while the controller is still initializing.
        pub uninitialized: bool @ 6,
        pub sourcing_high_voltage: bool @ 5,
        pub sourcing_vbus: bool @ 4,
        pub vbus_detection_enabled: bool @ 3,
        pub vbus_present: bool @ 2,
        pub vconn_present: bool @ 1,
        pub sinking_vbus: bool @ 0,
    }
}

bitfield! {
    /// Extended status register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ExtendedStatus(pub u8): Debug, FromStorage, IntoStorage {
        pub vsafe0v: bool @ 0,
    }
}

bitfield! {
    /// Header information that the controller uses for GoodCRC messages.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct MessageHeaderInfo(pub u8): Debug, FromStorage, IntoStorage {
        pub cable_plug: bool @ 4,
        pub data_role: bool @ 3,
        pub revision: u8 @ 1..=2,
        pub power_role: bool @ 0,
    }
}

bitfield! {
    /// Receive detect register, enabling reception per SOP type.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ReceiveDetect(pub u8): Debug, FromStorage, IntoStorage {
        pub cable_reset: bool @ 6,
        pub hard_reset: bool @ 5,
        pub sop_double_prime: bool @ 2,
        pub sop_prime: bool @ 1,
        pub sop: bool @ 0,
    }
}

/// Frame types in the TRANSMIT and RX_BUFFER registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Sop(Sop),
    HardReset,
    CableReset,
    BistCarrierMode2,
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::Sop(Sop::Sop),
            1 => Self::Sop(Sop::SopPrime),
            2 => Self::Sop(Sop::SopDoublePrime),
            3 => Self::Sop(Sop::DebugSopPrime),
            4 => Self::Sop(Sop::DebugSopDoublePrime),
            5 => Self::HardReset,
            6 => Self::CableReset,
            _ => Self::BistCarrierMode2,
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Sop(Sop::Sop) => 0,
            FrameType::Sop(Sop::SopPrime) => 1,
            FrameType::Sop(Sop::SopDoublePrime) => 2,
            FrameType::Sop(Sop::DebugSopPrime) => 3,
            FrameType::Sop(Sop::DebugSopDoublePrime) => 4,
            FrameType::HardReset => 5,
            FrameType::CableReset => 6,
            FrameType::BistCarrierMode2 => 7,
        }
    }
}

bitfield! {
    /// Transmit register. Writing it starts a transmission.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Transmit(pub u8): Debug, FromStorage, IntoStorage {
        pub retry_counter: u8 @ 4..=5,
        pub frame_type: u8 [FrameType] @ 0..=2,
    }
}

/// Commands for the COMMAND register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    WakeI2c = 0x11,
    DisableVbusDetect = 0x22,
    EnableVbusDetect = 0x33,
    DisableSinkVbus = 0x44,
    SinkVbus = 0x55,
    DisableSourceVbus = 0x66,
    SourceVbusDefaultVoltage = 0x77,
    SourceVbusNondefaultVoltage = 0x88,
    LookForConnection = 0x99,
    RxOneMore = 0xAA,
    SendFrSwapSignal = 0xCC,
    ResetTransmitBuffer = 0xDD,
    ResetReceiveBuffer = 0xEE,
    I2cIdle = 0xFF,
}
