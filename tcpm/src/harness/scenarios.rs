use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use heapless::Vec;

use super::partner::decode;
use super::tcpc::{Action, Transmission};
use super::*;
use crate::policy_engine::device_policy_manager::Event;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::bist::{BistDataObject, BistMode};
use crate::protocol_layer::message::data::request::{FixedVariableSupply, RawRequest};
use crate::protocol_layer::message::extended::{CountryCodes, Extended, ExtendedHeader};
use crate::protocol_layer::message::header::{ControlMessageType, DataMessageType, ExtendedMessageType, MessageType};
use crate::tcpci::registers::{CcStatusRegister, Command, FrameType, MessageHeaderInfo, address};
use crate::type_c::{LifecycleEvent, PortChannel, State, TypeC};
use crate::{DataRole, Sop, dummy};

const REQUEST: MessageType = MessageType::Data(DataMessageType::Request);
const SOURCE_CAPABILITIES: MessageType = MessageType::Data(DataMessageType::SourceCapabilities);

fn control(message_type: ControlMessageType) -> MessageType {
    MessageType::Control(message_type)
}

fn fixed_request(object_position: u8, raw_current: u16) -> RawRequest {
    RawRequest(
        FixedVariableSupply(0)
            .with_object_position(object_position)
            .with_raw_operating_current(raw_current)
            .with_raw_max_operating_current(raw_current)
            .0,
    )
}

/// Offer the example capabilities, and answer the request of the port.
fn offer_capabilities(harness: &mut Harness) {
    let capabilities = harness
        .partner
        .data(Data::SourceCapabilities(dummy::get_dummy_source_capabilities()));
    harness.tcpc.deliver(0, capabilities);

    let accept = harness.partner.reply_control(5, ControlMessageType::Accept);
    let ps_rdy = harness.partner.reply_control(30, ControlMessageType::PsRdy);
    harness.tcpc.reply_to(REQUEST, std::vec![accept, ps_rdy]);
}

async fn sink_contract(revision: SpecificationRevision) -> Harness {
    let mut harness = Harness::new(PowerRole::Sink, revision).await;
    offer_capabilities(&mut harness);
    harness.run_until(10, |pe| pe.is_ready()).await;

    assert!(harness.pe.port_state().flags.explicit_contract);
    harness
}

async fn source_contract() -> Harness {
    let mut harness = Harness::new(PowerRole::Source, SpecificationRevision::R3_X).await;
    let request = harness.partner.reply_data(5, Data::Request(fixed_request(1, 100)));
    harness.tcpc.reply_to(SOURCE_CAPABILITIES, std::vec![request]);
    harness.run_until(10, |pe| pe.is_ready()).await;

    assert!(harness.pe.port_state().flags.explicit_contract);
    harness
}

fn hard_resets(transmissions: &[Transmission]) -> std::vec::Vec<u64> {
    transmissions
        .iter()
        .filter(|transmission| transmission.frame_type == FrameType::HardReset)
        .map(|transmission| transmission.at)
        .collect()
}

#[tokio::test]
async fn test_sink_negotiation() {
    let harness = sink_contract(SpecificationRevision::R3_X).await;

    let transmissions = harness.tcpc.transmissions();
    let messages = decode(&transmissions);
    assert_eq!(messages.len(), 1);
    assert_eq!(transmissions[0].at, 0);

    match messages[0].data() {
        Some(Data::Request(rdo)) => assert_eq!(rdo.object_position(), 1),
        other => panic!("expected a request, got {:?}", other),
    }

    // Accept after 5 ms, PS_RDY after 30 ms.
    assert_eq!(clock::now(), 30);
    assert_eq!(
        harness.pe.port_state().source_capabilities,
        Some(dummy::get_dummy_source_capabilities())
    );
    assert_eq!(
        MessageHeaderInfo(harness.tcpc.register(address::MESSAGE_HEADER_INFO)),
        MessageHeaderInfo(0)
            .with_power_role(false)
            .with_data_role(false)
            .with_revision(SpecificationRevision::R3_X.into())
    );
}

#[tokio::test]
async fn test_retry_counts() {
    for (revision, retries) in [(SpecificationRevision::R2_0, 3), (SpecificationRevision::R3_X, 2)] {
        let mut harness = sink_contract(revision).await;
        let transmissions = harness.tcpc.transmissions();
        assert_eq!(transmissions[0].retries, retries);

        // Hard reset signaling is never retried.
        harness.pe.device_policy_manager().events.push_back(Event::HardReset);
        harness.step().await.unwrap();
        harness.step().await.unwrap();

        let transmissions = harness.tcpc.transmissions();
        assert_eq!(transmissions.len(), 1);
        assert_eq!(transmissions[0].frame_type, FrameType::HardReset);
        assert_eq!(transmissions[0].retries, 0);
    }
}

/// A source hard reset, where VBUS reaches vSafe0V and returns at the given times.
async fn hard_reset_by_source(vsafe0v_at: u64, vbus_present_at: u64) -> (Harness, u64, Result<(), Error>) {
    let mut harness = sink_contract(SpecificationRevision::R3_X).await;
    harness.tcpc.transmissions();

    let start = clock::now();
    harness.tcpc.schedule(0, Action::HardReset);
    harness.tcpc.schedule(vsafe0v_at, Action::PartnerVbus(false));
    harness.tcpc.schedule(vbus_present_at, Action::PartnerVbus(true));

    harness.step().await.unwrap();
    assert!(!harness.pe.is_ready());

    let result = harness.step().await;
    (harness, start, result)
}

/// The source starts over with message ID zero, and the port negotiates without another hard reset.
async fn renegotiate(harness: &mut Harness) {
    harness.partner.reset();
    offer_capabilities(harness);
    harness.run_until(10, |pe| pe.is_ready()).await;

    assert!(harness.pe.port_state().flags.explicit_contract);
    assert!(hard_resets(&harness.tcpc.transmissions()).is_empty());
}

#[tokio::test]
async fn test_normal() {
    let (mut harness, start, result) = hard_reset_by_source(30, 890).await;

    assert_eq!(result, Ok(()));
    assert_eq!(clock::now(), start + 890);
    assert_eq!(harness.pe.device_policy_manager().hard_resets, 1);
    assert!(!harness.pe.port_state().flags.explicit_contract);

    renegotiate(&mut harness).await;
}

#[tokio::test]
async fn test_vsafe0v_late() {
    let (mut harness, start, result) = hard_reset_by_source(700, 1500).await;

    // The sink follows the power cycle past tSafe0V.
    assert_eq!(result, Ok(()));
    assert_eq!(clock::now(), start + 1500);

    renegotiate(&mut harness).await;
}

#[tokio::test]
async fn test_vbus_present_late() {
    // Restored later than tSrcRecoverMax, but within tSrcTurnOn after that.
    let (mut harness, start, result) = hard_reset_by_source(30, 1200).await;

    assert_eq!(result, Ok(()));
    assert_eq!(clock::now(), start + 1200);

    renegotiate(&mut harness).await;
}

#[tokio::test]
async fn test_vbus_not_restored() {
    let (_harness, start, result) = hard_reset_by_source(30, 1430).await;

    assert_eq!(result, Err(Error::Disconnected));
    assert_eq!(clock::now(), start + 30 + 1275);
}

#[tokio::test]
async fn test_get_sink_cap_without_good_crc() {
    let mut harness = source_contract().await;
    harness.tcpc.transmissions();

    harness.tcpc.withhold_good_crc(1);
    harness
        .pe
        .device_policy_manager()
        .events
        .push_back(Event::RequestSinkCapabilities);

    // The partner starts over after the soft reset.
    harness.partner.reset();
    let accept = harness.partner.reply_control(5, ControlMessageType::Accept);
    let request = harness.partner.reply_data(5, Data::Request(fixed_request(1, 100)));
    harness.tcpc.reply_to(control(ControlMessageType::SoftReset), std::vec![accept]);
    harness.tcpc.reply_to(SOURCE_CAPABILITIES, std::vec![request]);

    harness.run_until(10, |pe| pe.is_ready()).await;

    assert!(!harness.tcpc.has_pending_replies());
    assert!(harness.pe.port_state().flags.explicit_contract);

    let transmissions = harness.tcpc.transmissions();
    let sent: std::vec::Vec<(MessageType, u64)> = transmissions
        .iter()
        .filter_map(|transmission| Some((transmission.message_type()?, transmission.at)))
        .collect();
    assert_eq!(
        sent.iter().map(|(message_type, _)| *message_type).collect::<std::vec::Vec<_>>(),
        [
            control(ControlMessageType::GetSinkCap),
            control(ControlMessageType::SoftReset),
            SOURCE_CAPABILITIES,
            control(ControlMessageType::Accept),
            control(ControlMessageType::PsRdy),
        ]
    );

    // Soft_Reset goes out within tReceive + tSoftReset (1.1 ms + 15 ms) of the failed message.
    let (get_sink_cap_at, soft_reset_at) = (sent[0].1, sent[1].1);
    assert!(soft_reset_at >= get_sink_cap_at);
    assert!(soft_reset_at - get_sink_cap_at <= 16);
}

#[tokio::test]
async fn test_chunk_timeout_recovery() {
    let mut harness = sink_contract(SpecificationRevision::R3_X).await;
    harness.tcpc.transmissions();
    let start = clock::now();

    // 42 bytes take two chunks, but only the first one arrives.
    let country_codes = Extended::CountryCodes(CountryCodes(Vec::from_slice(&[*b"DE"; 20]).unwrap()));
    let chunk = harness.partner.chunk(&country_codes, 0);
    harness.tcpc.deliver(0, chunk);

    harness.step().await.unwrap();
    assert!(harness.pe.is_ready());
    assert_eq!(clock::now(), start + 25);

    let transmissions = harness.tcpc.transmissions();
    assert_eq!(transmissions.len(), 1);
    assert_eq!(
        transmissions[0].message_type(),
        Some(MessageType::Extended(ExtendedMessageType::CountryCodes))
    );
    let extended_header = ExtendedHeader::from_bytes(&transmissions[0].data[2..]).unwrap();
    assert!(extended_header.request_chunk());
    assert_eq!(extended_header.chunk_number(), 1);

    // The port communicates as before.
    let get_sink_cap = harness.partner.control(ControlMessageType::GetSinkCap);
    harness.tcpc.deliver(0, get_sink_cap);
    harness.run_until(3, |pe| pe.is_ready()).await;

    assert_eq!(
        harness.tcpc.transmitted_types(),
        [MessageType::Data(DataMessageType::SinkCapabilities)]
    );
}

#[tokio::test]
async fn test_not_supported() {
    for (revision, answer) in [
        (SpecificationRevision::R3_X, ControlMessageType::NotSupported),
        (SpecificationRevision::R2_0, ControlMessageType::Reject),
    ] {
        let mut harness = sink_contract(revision).await;
        harness.tcpc.transmissions();

        let get_pps_status = harness.partner.control(ControlMessageType::GetPpsStatus);
        harness.tcpc.deliver(0, get_pps_status);
        harness.run_until(3, |pe| pe.is_ready()).await;

        assert_eq!(harness.tcpc.transmitted_types(), [control(answer)]);
    }
}

#[tokio::test]
async fn test_data_role_swap() {
    let mut harness = sink_contract(SpecificationRevision::R3_X).await;
    harness.tcpc.transmissions();

    let dr_swap = harness.partner.control(ControlMessageType::DrSwap);
    harness.tcpc.deliver(0, dr_swap);
    harness.run_until(5, |pe| pe.is_ready()).await;

    assert_eq!(harness.pe.port_state().data_role, DataRole::Dfp);
    assert_eq!(harness.tcpc.transmitted_types(), [control(ControlMessageType::Accept)]);
    assert!(MessageHeaderInfo(harness.tcpc.register(address::MESSAGE_HEADER_INFO)).data_role());
}

#[tokio::test]
async fn test_power_role_swap() {
    let mut harness = sink_contract(SpecificationRevision::R3_X).await;
    harness.tcpc.transmissions();
    harness.tcpc.commands();
    let start = clock::now();

    let pr_swap = harness.partner.control(ControlMessageType::PrSwap);
    harness.tcpc.deliver(0, pr_swap);

    // The old source turns VBUS off, and tells so.
    let ps_rdy = harness.partner.reply_control(35, ControlMessageType::PsRdy);
    harness.tcpc.reply_to(
        control(ControlMessageType::Accept),
        std::vec![(20, Action::PartnerVbus(false)), ps_rdy],
    );

    harness
        .run_until(5, |pe| pe.port_state().power_role == PowerRole::Source)
        .await;

    assert_eq!(clock::now(), start + 35);
    assert!(harness.tcpc.vbus_present());
    assert_eq!(
        harness.tcpc.commands(),
        [Command::DisableSinkVbus, Command::SourceVbusDefaultVoltage]
    );

    let transmissions = harness.tcpc.transmissions();
    let messages = decode(&transmissions);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].header.message_type(), control(ControlMessageType::PsRdy));
    assert_eq!(messages[1].header.port_power_role(), PowerRole::Source);
    assert!(MessageHeaderInfo(harness.tcpc.register(address::MESSAGE_HEADER_INFO)).power_role());
}

#[tokio::test]
async fn test_bist_carrier_mode() {
    let mut harness = sink_contract(SpecificationRevision::R3_X).await;
    harness.tcpc.transmissions();
    let start = clock::now();

    let bist = harness
        .partner
        .data(Data::Bist(BistDataObject::new(BistMode::CarrierMode2)));
    harness.tcpc.deliver(0, bist);
    harness.run_until(3, |pe| pe.is_ready()).await;

    let transmissions = harness.tcpc.transmissions();
    assert_eq!(transmissions.len(), 1);
    assert_eq!(transmissions[0].frame_type, FrameType::BistCarrierMode2);
    assert_eq!(clock::now(), start + 45);
}

/// A sink termination on CC1, resolved by a toggling port.
fn sink_on_cc1() -> CcStatusRegister {
    CcStatusRegister(0).with_cc1_state(0b10)
}

/// A source termination of 3.0 A on CC1, resolved by a toggling port.
fn source_on_cc1() -> CcStatusRegister {
    CcStatusRegister(0).with_connect_result(true).with_cc1_state(0b11)
}

#[tokio::test]
async fn test_source_bring_up() {
    clock::reset();
    let channel = PortChannel::<NoopRawMutex>::new();
    let (tcpc, tcpci) = tcpc::TcpcHandle::new();
    let mut partner = partner::Partner::new(PowerRole::Sink, SpecificationRevision::R3_X);

    tcpc.set_cc_status(sink_on_cc1());
    let request = partner.reply_data(5, Data::Request(fixed_request(1, 100)));
    tcpc.reply_to(SOURCE_CAPABILITIES, std::vec![request]);

    let mut tc = TypeC::<_, _, VirtualTimer, _>::new(tcpci, DummyDevice::default(), config(), &channel);
    channel.send(LifecycleEvent::Init);

    for _ in 0..20 {
        tc.run_step().await;
        if tc.policy_engine().is_ready() && channel.status().sop_connected {
            break;
        }
    }

    assert_eq!(tc.state(), State::AttachedSrc);
    assert!(tcpc.vbus_present());

    let status = channel.status();
    assert!(status.pd_enabled);
    assert!(status.dev_connected);
    assert_eq!(status.tc_state, "Attached.SRC");
    assert_eq!(status.power_role, PowerRole::Source);
    assert_eq!(status.data_role, Some(DataRole::Dfp));

    assert_eq!(
        tcpc.transmitted_types(),
        [
            SOURCE_CAPABILITIES,
            control(ControlMessageType::Accept),
            control(ControlMessageType::PsRdy),
        ]
    );
}

#[tokio::test]
async fn test_sink_bring_up() {
    clock::reset();
    let channel = PortChannel::<NoopRawMutex>::new();
    let (tcpc, tcpci) = tcpc::TcpcHandle::new();
    let mut partner = partner::Partner::new(PowerRole::Source, SpecificationRevision::R3_X);

    tcpc.set_partner_vbus(true);
    tcpc.set_cc_status(source_on_cc1());

    // Offered once the port looks for capabilities after tCCDebounce.
    tcpc.schedule(
        120,
        Action::Receive(
            Sop::Sop,
            partner.data(Data::SourceCapabilities(dummy::get_dummy_source_capabilities())),
        ),
    );
    let accept = partner.reply_control(5, ControlMessageType::Accept);
    let ps_rdy = partner.reply_control(30, ControlMessageType::PsRdy);
    tcpc.reply_to(REQUEST, std::vec![accept, ps_rdy]);

    let mut tc = TypeC::<_, _, VirtualTimer, _>::new(tcpci, DummyDevice::default(), config(), &channel);
    channel.send(LifecycleEvent::Init);

    for _ in 0..20 {
        tc.run_step().await;
        if tc.policy_engine().is_ready() {
            break;
        }
    }

    assert_eq!(tc.state(), State::AttachedSnk);
    assert_eq!(clock::now(), 150);

    let status = channel.status();
    assert!(status.sop_connected);
    assert_eq!(status.tc_state, "Attached.SNK");
    assert_eq!(status.polarity, tcpm_traits::Polarity::Cc1);
    assert_eq!(status.source_capabilities.len(), 3);
    assert_eq!(status.sop_revision, 0x3000);

    let commands = tcpc.commands();
    assert!(commands.contains(&Command::LookForConnection));
    assert!(commands.contains(&Command::SinkVbus));
}

#[tokio::test]
async fn test_repeated_hard_reset_status() {
    clock::reset();
    let channel = PortChannel::<NoopRawMutex>::new();
    let (tcpc, tcpci) = tcpc::TcpcHandle::new();

    // A source that never sends capabilities.
    tcpc.set_partner_vbus(true);
    tcpc.set_cc_status(source_on_cc1());

    let mut tc = TypeC::<_, _, VirtualTimer, _>::new(tcpci, DummyDevice::default(), config(), &channel);
    channel.send(LifecycleEvent::Init);

    for _ in 0..60 {
        tc.run_step().await;
        if tc.pd_stopped() {
            break;
        }
    }

    assert!(tc.pd_stopped());
    assert_eq!(tc.state(), State::AttachedSnk);

    // tCCDebounce, then tTypeCSinkWaitCap.
    let hard_reset_times = hard_resets(&tcpc.transmissions());
    assert_eq!(hard_reset_times.len(), 3);
    assert_eq!(hard_reset_times[0], 100 + 575);

    let status = channel.status();
    assert!(status.pd_enabled);
    assert!(status.dev_connected);
    assert!(!status.sop_connected);
    assert_eq!(status.tc_state, "Attached.SNK");

    // Detach ends the attachment.
    tcpc.set_cc_status(CcStatusRegister(0));
    tcpc.set_partner_vbus(false);
    tc.run_step().await;
    assert_eq!(tc.state(), State::Unattached);
    assert!(channel.status().events.disconnected());
}
