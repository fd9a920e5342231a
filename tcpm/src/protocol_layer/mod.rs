//! The protocol layer is controlled by the policy engine, and commands the PHY layer.
//!
//! Handles
//! - construction of messages,
//! - message IDs and duplicate detection, per SOP type,
//! - GoodCRC handling and retries, unless the port controller does both in hardware,
//! - chunking of extended messages,
//! - reset operation.
pub mod message;

use core::marker::PhantomData;

use embassy_futures::select::{Either, select};
use heapless::Vec;
use message::data::Data;
use message::extended::chunked::{
    ChunkResult, ChunkedMessageAssembler, ChunkedMessageSender, MAX_EXTENDED_MSG_CHUNK_LEN, MAX_EXTENDED_MSG_LEN,
    frame_chunk_request,
};
use message::extended::{Extended, ExtendedHeader};
use message::header::{ControlMessageType, DataMessageType, ExtendedMessageType, Header, MessageType};
use message::{Message, ParseError, Payload};
use tcpm_traits::{Driver, DriverRxError, DriverTxError};

use crate::counters::{Counter, CounterType, retry_count};
use crate::timers::{Timer, TimerType};
use crate::{DataRole, PowerRole, Sop, SpecificationRevision};


/// The largest frame on the wire: a header and seven data objects.
const MAX_MESSAGE_SIZE: usize = 30;

/// Errors during message reception.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// Hard Reset signaling was received.
    #[error("hard reset received")]
    HardReset,
    /// The port partner requested a soft reset.
    #[error("soft reset received")]
    SoftReset,
    /// No expected message arrived in time.
    #[error("receive timeout")]
    ReceiveTimeout,
    /// A message of a reserved type was received.
    #[error("unsupported message")]
    UnsupportedMessage,
    /// The port partner detached.
    #[error("disconnected")]
    Disconnected,
    /// A fast role swap signal was received.
    #[error("fast role swap signal received")]
    FastRoleSwap,
    /// A chunked extended message arrived, while chunking is disabled.
    #[error("chunking not supported")]
    ChunkingNotSupported,
}

/// Errors during message transmission.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// Hard Reset signaling was received.
    #[error("hard reset received")]
    HardReset,
    /// The port partner detached.
    #[error("disconnected")]
    Disconnected,
}

/// Errors of the protocol layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Reception failed.
    #[error("receive error: {0}")]
    RxError(RxError),
    /// Transmission failed.
    #[error("transmit error: {0}")]
    TxError(TxError),
    /// No GoodCRC arrived after the given number of retries.
    #[error("transmission not acknowledged after {0} retries")]
    TransmitRetriesExceeded(u8),
    /// A message arrived that does not fit the ongoing exchange.
    #[error("unexpected message")]
    UnexpectedMessage,
    /// Chunks or chunk requests arrived out of order.
    #[error("chunk sequence error")]
    ChunkSequence,
    /// A received message could not be parsed.
    #[error("parse error: {0}")]
    Parse(ParseError),
}

impl From<RxError> for ProtocolError {
    fn from(value: RxError) -> Self {
        Self::RxError(value)
    }
}

impl From<TxError> for ProtocolError {
    fn from(value: TxError) -> Self {
        Self::TxError(value)
    }
}

impl From<ParseError> for ProtocolError {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

/// Message ID and revision bookkeeping of one SOP type.
#[derive(Debug, Clone, Copy)]
struct SopState {
    tx_message_id: Counter,
    rx_message_id: Option<u8>,
    revision: SpecificationRevision,
}

impl SopState {
    fn new(revision: SpecificationRevision) -> Self {
        Self {
            tx_message_id: Counter::new(CounterType::MessageId),
            rx_message_id: None,
            revision,
        }
    }

    fn reset(&mut self) {
        self.tx_message_id.reset();
        self.rx_message_id = None;
    }
}

/// A received frame, before reassembly.
enum Frame {
    Message(Sop, Message),
    GoodCrc(Sop, u8),
    ChunkRequest(Sop, u8),
    Chunk(Sop, Header, ExtendedHeader, Vec<u8, MAX_EXTENDED_MSG_CHUNK_LEN>),
}

/// Debug SOP types share the bookkeeping of the cable plugs.
fn sop_index(sop: Sop) -> usize {
    match sop {
        Sop::Sop => 0,
        Sop::SopPrime | Sop::DebugSopPrime => 1,
        Sop::SopDoublePrime | Sop::DebugSopDoublePrime => 2,
    }
}

/// The USB PD protocol layer.
pub struct ProtocolLayer<DRIVER: Driver, TIMER: Timer> {
    driver: DRIVER,
    header_template: Header,
    sops: [SopState; 3],
    assembler: ChunkedMessageAssembler,
    /// A message that arrived while waiting for something else.
    pending: Option<(Sop, Message)>,
    chunking: bool,
    _timer: PhantomData<TIMER>,
}

impl<DRIVER: Driver, TIMER: Timer> ProtocolLayer<DRIVER, TIMER> {
    /// Create a new protocol layer from a driver and a header template.
    ///
    /// The template carries the port's roles, and the highest revision that it speaks.
    pub fn new(driver: DRIVER, header_template: Header) -> Self {
        let revision = header_template.revision();

        Self {
            driver,
            header_template,
            sops: [SopState::new(revision); 3],
            assembler: ChunkedMessageAssembler::new(),
            pending: None,
            chunking: true,
            _timer: PhantomData,
        }
    }

    /// Access the driver.
    pub fn driver(&mut self) -> &mut DRIVER {
        &mut self.driver
    }

    /// Enable or disable the reassembly of chunked extended messages.
    pub fn set_chunking(&mut self, enabled: bool) {
        self.chunking = enabled;
    }

    /// Change the roles that are announced in message headers.
    pub fn set_roles(&mut self, power_role: PowerRole, data_role: DataRole) {
        self.header_template = self
            .header_template
            .with_port_power_role(power_role)
            .with_port_data_role(data_role);
    }

    /// The present power role.
    pub fn power_role(&self) -> PowerRole {
        self.header_template.port_power_role()
    }

    /// The present data role.
    pub fn data_role(&self) -> DataRole {
        self.header_template.port_data_role()
    }

    /// The revision that is used towards a SOP type.
    ///
    /// Starts out as the port's highest revision, and follows the lowest revision that was received.
    pub fn revision(&self, sop: Sop) -> SpecificationRevision {
        self.sops[sop_index(sop)].revision
    }

    /// Reset message IDs of all SOP types, as for a soft reset.
    pub fn reset(&mut self) {
        for state in self.sops.iter_mut() {
            state.reset();
        }

        self.assembler.reset();
        self.pending = None;
    }

    /// Reset message IDs of a single SOP type.
    pub fn reset_sop(&mut self, sop: Sop) {
        self.sops[sop_index(sop)].reset();

        if sop == Sop::Sop {
            self.assembler.reset();
        }
    }

    /// Reset message IDs and revisions, as after a hard reset.
    pub fn hard_reset_state(&mut self) {
        self.reset();

        let revision = self.header_template.revision();
        for state in self.sops.iter_mut() {
            state.revision = revision;
        }
    }

    /// Fill in message ID, revision and roles for a frame on a SOP type.
    fn finalize_header(&self, sop: Sop, header: Header, message_id: u8) -> Header {
        let state = &self.sops[sop_index(sop)];
        let header = header.with_message_id(message_id).with_spec_revision(state.revision);

        match sop {
            Sop::Sop => header
                .with_port_power_role(self.header_template.port_power_role())
                .with_port_data_role(self.header_template.port_data_role()),
            // Messages towards cable plugs are marked as originating from a port.
            _ => header
                .with_port_power_role(PowerRole::Sink)
                .with_port_data_role(DataRole::Ufp),
        }
    }

    async fn transmit_good_crc(&mut self, sop: Sop, received: Header) -> Result<(), ProtocolError> {
        let header = self.finalize_header(
            sop,
            Header::new_control(self.header_template, 0, ControlMessageType::GoodCRC),
            received.message_id(),
        );
        let header = header.with_spec_revision(self.revision(sop).min(received.revision()));

        let mut buffer = [0u8; 2];
        header.to_bytes(&mut buffer);

        match self.driver.transmit(sop, &buffer, 0).await {
            Ok(()) | Err(DriverTxError::Discarded | DriverTxError::Failed) => Ok(()),
            Err(DriverTxError::HardReset) => Err(TxError::HardReset.into()),
            Err(DriverTxError::Disconnected) => Err(TxError::Disconnected.into()),
        }
    }

    /// Receive a single frame from the driver.
    ///
    /// Retransmissions and unparseable headers are dropped. Soft resets reset the message IDs of their SOP.
    async fn receive_frame(&mut self) -> Result<Frame, ProtocolError> {
        loop {
            let mut buffer = [0u8; MAX_MESSAGE_SIZE];

            let (sop, length) = match self.driver.receive(&mut buffer).await {
                Ok(received) => received,
                Err(DriverRxError::Discarded) => continue,
                Err(DriverRxError::HardReset) => return Err(RxError::HardReset.into()),
                Err(DriverRxError::Disconnected) => return Err(RxError::Disconnected.into()),
                Err(DriverRxError::FastRoleSwap) => return Err(RxError::FastRoleSwap.into()),
            };

            let frame = &buffer[..length];
            let header = match Header::from_bytes(frame) {
                Ok(header) => header,
                Err(_error) => {
                    warn!("Drop frame with invalid header: {:?}", _error);
                    continue;
                }
            };

            if header.is_control(ControlMessageType::GoodCRC) {
                return Ok(Frame::GoodCrc(sop, header.message_id()));
            }

            if !DRIVER::HAS_AUTO_GOOD_CRC {
                self.transmit_good_crc(sop, header).await?;
            }

            let index = sop_index(sop);

            if header.is_control(ControlMessageType::SoftReset) {
                debug!("Soft reset on {:?}", sop);
                self.reset_sop(sop);
                self.sops[index].rx_message_id = Some(header.message_id());
                return Err(RxError::SoftReset.into());
            }

            let state = &mut self.sops[index];
            if state.rx_message_id == Some(header.message_id()) {
                trace!("Drop retransmission of message ID {}", header.message_id());
                continue;
            }

            state.rx_message_id = Some(header.message_id());
            state.revision = state.revision.min(header.revision());

            match header.message_type() {
                MessageType::Control(ControlMessageType::Reserved(_))
                | MessageType::Data(DataMessageType::Reserved(_))
                | MessageType::Extended(ExtendedMessageType::Reserved(_)) => {
                    return Err(RxError::UnsupportedMessage.into());
                }
                MessageType::Extended(_) => {
                    let extended_header = ExtendedHeader::from_bytes(&frame[2..])?;
                    let end = (2 + 4 * header.num_objects()).min(length);

                    if extended_header.request_chunk() {
                        return Ok(Frame::ChunkRequest(sop, extended_header.chunk_number()));
                    }

                    if extended_header.chunked() && extended_header.data_size() as usize > MAX_EXTENDED_MSG_CHUNK_LEN {
                        let data = &frame[4.min(end)..end];
                        let data = Vec::from_slice(&data[..data.len().min(MAX_EXTENDED_MSG_CHUNK_LEN)])
                            .map_err(|_| ParseError::ChunkOverflow(data.len(), MAX_EXTENDED_MSG_CHUNK_LEN))?;
                        return Ok(Frame::Chunk(sop, header, extended_header, data));
                    }
                }
                _ => (),
            }

            return Ok(Frame::Message(sop, Message::from_bytes(frame)?));
        }
    }

    /// Collect the remaining chunks of an extended message.
    ///
    /// A message that is not a chunk aborts reception, and is returned instead.
    async fn receive_chunked(
        &mut self,
        sop: Sop,
        header: Header,
        extended_header: ExtendedHeader,
        data: &[u8],
    ) -> Result<(Sop, Message), ProtocolError> {
        self.assembler.reset();
        let mut result = self.assembler.process_chunk(header, extended_header, data)?;

        loop {
            let chunk_number = match result {
                ChunkResult::Complete(payload) => {
                    let message_type = header.message_type_raw().into();
                    let extended = Extended::parse(message_type, &payload);
                    return Ok((sop, Message::new_with_extended(header, extended)));
                }
                ChunkResult::NeedMoreChunks(chunk_number) => chunk_number,
            };

            let mut buffer = [0u8; MAX_MESSAGE_SIZE];
            let request_header = Header::new_extended(self.header_template, 0, header.message_type_raw().into(), 1);
            let len = frame_chunk_request(request_header, chunk_number, &mut buffer);
            self.transmit_frame(sop, &mut buffer[..len]).await?;

            let next = async {
                loop {
                    match self.receive_frame().await? {
                        Frame::GoodCrc(..) => continue,
                        other => return Ok::<Frame, ProtocolError>(other),
                    }
                }
            };

            match select(next, TimerType::new::<TIMER>(TimerType::ChunkSenderResponse)).await {
                Either::First(frame) => match frame? {
                    Frame::Chunk(chunk_sop, chunk_header, chunk_extended_header, chunk_data)
                        if chunk_sop == sop && chunk_header.message_type_raw() == header.message_type_raw() =>
                    {
                        result = self
                            .assembler
                            .process_chunk(chunk_header, chunk_extended_header, &chunk_data)
                            .inspect_err(|_| self.assembler.reset())?;
                    }
                    Frame::Message(other_sop, message) => {
                        debug!("Chunked reception aborted by {:?}", message.header.message_type());
                        self.assembler.reset();
                        return Ok((other_sop, message));
                    }
                    _ => {
                        self.assembler.reset();
                        return Err(ProtocolError::ChunkSequence);
                    }
                },
                Either::Second(_) => {
                    warn!("Chunk {} not received, drop message", chunk_number);
                    self.assembler.reset();
                    return Err(RxError::ReceiveTimeout.into());
                }
            }
        }
    }

    /// Receive the next message on any SOP type.
    pub async fn receive(&mut self) -> Result<(Sop, Message), ProtocolError> {
        if let Some(pending) = self.pending.take() {
            return Ok(pending);
        }

        loop {
            match self.receive_frame().await? {
                Frame::Message(sop, message) => return Ok((sop, message)),
                Frame::Chunk(..) if !self.chunking => return Err(RxError::ChunkingNotSupported.into()),
                Frame::Chunk(sop, header, extended_header, data) => {
                    return self.receive_chunked(sop, header, extended_header, &data).await;
                }
                Frame::GoodCrc(_sop, _message_id) => {
                    trace!("Drop stray GoodCRC {} on {:?}", _message_id, _sop);
                }
                Frame::ChunkRequest(_sop, _chunk_number) => {
                    warn!("Drop chunk request {} on {:?}, nothing is sent", _chunk_number, _sop);
                }
            }
        }
    }

    /// Wait until a message of one of the chosen types is received on a SOP type, or a timeout occurs.
    ///
    /// Messages on other SOP types are dropped.
    pub async fn receive_message_type(
        &mut self,
        sop: Sop,
        message_types: &[MessageType],
        timer_type: TimerType,
    ) -> Result<Message, ProtocolError> {
        let receive_fut = async {
            loop {
                let (rx_sop, message) = self.receive().await?;

                if rx_sop != sop {
                    debug!("Drop {:?} message while waiting on {:?}", rx_sop, sop);
                    continue;
                }

                return if message_types.contains(&message.header.message_type()) {
                    Ok(message)
                } else {
                    debug!("Unexpected message {:?}", message.header.message_type());
                    Err(ProtocolError::UnexpectedMessage)
                };
            }
        };

        match select(receive_fut, TimerType::new::<TIMER>(timer_type)).await {
            Either::First(result) => result,
            Either::Second(_) => Err(RxError::ReceiveTimeout.into()),
        }
    }

    /// Wait for the GoodCRC of a message that was sent in software.
    async fn wait_for_good_crc(&mut self, sop: Sop, message_id: u8) -> Result<(), ProtocolError> {
        loop {
            match self.receive_frame().await? {
                Frame::GoodCrc(rx_sop, rx_message_id) if rx_sop == sop && rx_message_id == message_id => return Ok(()),
                Frame::Message(rx_sop, message) => {
                    debug!("Keep {:?} that arrived before GoodCRC", message.header.message_type());
                    self.pending = Some((rx_sop, message));
                }
                _ => (),
            }
        }
    }

    async fn transmit_with_hardware_retries(&mut self, sop: Sop, frame: &[u8], retries: u8) -> Result<(), ProtocolError> {
        // Discarded transmissions are retried, as the line was busy.
        for _ in 0..=retries {
            match self.driver.transmit(sop, frame, retries).await {
                Ok(()) => return Ok(()),
                Err(DriverTxError::Discarded) => trace!("Transmission discarded"),
                Err(DriverTxError::Failed) => return Err(ProtocolError::TransmitRetriesExceeded(retries)),
                Err(DriverTxError::HardReset) => return Err(TxError::HardReset.into()),
                Err(DriverTxError::Disconnected) => return Err(TxError::Disconnected.into()),
            }
        }

        Err(ProtocolError::TransmitRetriesExceeded(retries))
    }

    async fn transmit_with_software_retries(&mut self, sop: Sop, frame: &[u8], retries: u8) -> Result<(), ProtocolError> {
        let message_id = self.sops[sop_index(sop)].tx_message_id.value();

        for _attempt in 0..=retries {
            match self.driver.transmit(sop, frame, 0).await {
                Ok(()) => (),
                Err(DriverTxError::Discarded | DriverTxError::Failed) => continue,
                Err(DriverTxError::HardReset) => return Err(TxError::HardReset.into()),
                Err(DriverTxError::Disconnected) => return Err(TxError::Disconnected.into()),
            }

            match select(
                self.wait_for_good_crc(sop, message_id),
                TimerType::new::<TIMER>(TimerType::CRCReceive),
            )
            .await
            {
                Either::First(result) => return result,
                Either::Second(_) => trace!("No GoodCRC for attempt {}", _attempt),
            }
        }

        Err(ProtocolError::TransmitRetriesExceeded(retries))
    }

    /// Transmit a serialized frame, filling in the header.
    ///
    /// The message ID advances whether or not the frame was acknowledged.
    async fn transmit_frame(&mut self, sop: Sop, frame: &mut [u8]) -> Result<(), ProtocolError> {
        let index = sop_index(sop);
        let header = self.finalize_header(sop, Header::from_bytes(frame)?, self.sops[index].tx_message_id.value());
        header.to_bytes(frame);

        let retries = retry_count(self.sops[index].revision);
        let result = if DRIVER::HAS_AUTO_RETRY {
            self.transmit_with_hardware_retries(sop, frame, retries).await
        } else {
            self.transmit_with_software_retries(sop, frame, retries).await
        };

        _ = self.sops[index].tx_message_id.increment();
        result
    }

    /// Send an extended payload in chunks, each after the receiver requested it.
    async fn transmit_chunked(&mut self, sop: Sop, header: Header, payload: &[u8]) -> Result<(), ProtocolError> {
        let sender = ChunkedMessageSender::new(payload);
        let mut chunk_number = 0;

        loop {
            let mut buffer = [0u8; MAX_MESSAGE_SIZE];
            let len = sender.frame_chunk(header, chunk_number, &mut buffer);
            self.transmit_frame(sop, &mut buffer[..len]).await?;

            chunk_number += 1;
            if chunk_number >= sender.total_chunks() {
                return Ok(());
            }

            let request_fut = async {
                loop {
                    match self.receive_frame().await? {
                        Frame::GoodCrc(..) => continue,
                        other => return Ok::<Frame, ProtocolError>(other),
                    }
                }
            };

            match select(request_fut, TimerType::new::<TIMER>(TimerType::ChunkSenderRequest)).await {
                Either::First(frame) => match frame? {
                    Frame::ChunkRequest(rx_sop, requested) if rx_sop == sop && requested == chunk_number => (),
                    Frame::Message(rx_sop, message) => {
                        debug!("Chunked transmission ended by {:?}", message.header.message_type());
                        self.pending = Some((rx_sop, message));
                        return Ok(());
                    }
                    _ => return Err(ProtocolError::ChunkSequence),
                },
                Either::Second(_) => {
                    debug!("No request for chunk {}, transmission complete", chunk_number);
                    return Ok(());
                }
            }
        }
    }

    /// Transmit a message.
    ///
    /// Message ID, revision and roles of the header are filled in.
    pub async fn transmit(&mut self, sop: Sop, message: Message) -> Result<(), ProtocolError> {
        trace!("Transmit {:?} on {:?}", message.header.message_type(), sop);

        if let Some(Payload::Extended(extended)) = message.payload.as_ref() {
            let mut payload = [0u8; MAX_EXTENDED_MSG_LEN];
            let size = extended.to_bytes(&mut payload);

            if size > MAX_EXTENDED_MSG_CHUNK_LEN {
                return self.transmit_chunked(sop, message.header, &payload[..size]).await;
            }
        }

        let mut buffer = [0u8; MAX_MESSAGE_SIZE];
        let len = message.to_bytes(&mut buffer);
        self.transmit_frame(sop, &mut buffer[..len]).await
    }

    /// Transmit a control message of the provided type.
    pub async fn transmit_control(&mut self, sop: Sop, message_type: ControlMessageType) -> Result<(), ProtocolError> {
        let header = Header::new_control(self.header_template, 0, message_type);
        self.transmit(sop, Message::new(header)).await
    }

    /// Transmit a data message.
    pub async fn transmit_data(&mut self, sop: Sop, data: Data) -> Result<(), ProtocolError> {
        let header = Header::new_data(self.header_template, 0, data.message_type(), data.num_objects());
        self.transmit(sop, Message::new_with_data(header, data)).await
    }

    /// Transmit an extended message, chunked if needed.
    pub async fn transmit_extended(&mut self, sop: Sop, extended: Extended) -> Result<(), ProtocolError> {
        let header = Header::new_extended(self.header_template, 0, extended.message_type(), 0);
        self.transmit(sop, Message::new_with_extended(header, extended)).await
    }

    /// Transmit Hard Reset signaling, and reset message IDs and revisions.
    pub async fn hard_reset(&mut self) -> Result<(), ProtocolError> {
        self.hard_reset_state();

        match self.driver.transmit_hard_reset().await {
            Ok(()) | Err(DriverTxError::HardReset) => Ok(()),
            Err(DriverTxError::Disconnected) => Err(TxError::Disconnected.into()),
            Err(DriverTxError::Discarded | DriverTxError::Failed) => {
                warn!("Hard reset signaling not confirmed");
                Ok(())
            }
        }
    }
}
