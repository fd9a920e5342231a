//! Timers that are used by the protocol layer, policy engine and Type-C state machine.
use core::future::Future;

/// The timer trait to implement by the user application.
pub trait Timer {
    /// Expire after the specified number of milliseconds.
    fn after_millis(milliseconds: u64) -> impl Future<Output = ()>;
}

/// Types of timers that are used for timeouts.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerType {
    BISTContMode,
    CCDebounce,
    ChunkingNotSupported,
    ChunkReceiverRequest,
    ChunkSenderRequest,
    ChunkSenderResponse,
    CRCReceive,
    DiscoverIdentity,
    ErrorRecovery,
    HardResetComplete,
    NoResponse,
    PDDebounce,
    PRSwapWait,
    PSHardReset,
    PSSourceOff,
    PSSourceOn,
    PSTransition,
    ReceiverResponse,
    Safe0V,
    SendSourceCap,
    SenderResponse,
    SinkRequest,
    SinkTx,
    SinkWaitCap,
    SourceTurnOnDelay,
    SrcRecover,
    SrcRecoverMax,
    SrcTransition,
    SrcTurnOn,
    SwapSourceStart,
    VCONNSourceOn,
    VCONNStable,
    VDMSenderResponse,
}

impl TimerType {
    /// The duration of a timer in milliseconds.
    pub const fn millis(self) -> u64 {
        match self {
            TimerType::BISTContMode => 45,
            TimerType::CCDebounce => 100,
            TimerType::ChunkingNotSupported => 45,
            TimerType::ChunkReceiverRequest => 15,
            TimerType::ChunkSenderRequest => 25,
            TimerType::ChunkSenderResponse => 25,
            TimerType::CRCReceive => 1,
            TimerType::DiscoverIdentity => 45,
            TimerType::ErrorRecovery => 240,
            TimerType::HardResetComplete => 5,
            TimerType::NoResponse => 5500,
            TimerType::PDDebounce => 15,
            TimerType::PRSwapWait => 100,
            TimerType::PSHardReset => 25,
            TimerType::PSSourceOff => 835,
            TimerType::PSSourceOn => 435,
            TimerType::PSTransition => 500,
            TimerType::ReceiverResponse => 15,
            TimerType::Safe0V => 650,
            TimerType::SendSourceCap => 100,
            TimerType::SenderResponse => 26,
            TimerType::SinkRequest => 100,
            TimerType::SinkTx => 18,
            TimerType::SinkWaitCap => 575,
            TimerType::SourceTurnOnDelay => 30,
            TimerType::SrcRecover => 760,
            TimerType::SrcRecoverMax => 1000,
            TimerType::SrcTransition => 25,
            TimerType::SrcTurnOn => 275,
            TimerType::SwapSourceStart => 25,
            TimerType::VCONNSourceOn => 100,
            TimerType::VCONNStable => 50,
            TimerType::VDMSenderResponse => 30,
        }
    }

    /// Create a new timer for a given type.
    ///
    /// Times out after the duration given by [`TimerType::millis`].
    pub fn new<TIMER: Timer>(timer_type: TimerType) -> impl Future<Output = ()> {
        TIMER::after_millis(timer_type.millis())
    }
}
