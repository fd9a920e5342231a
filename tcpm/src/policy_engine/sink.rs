//! Sink states of the policy engine.
use tcpm_traits::{PortController, VbusLevel};

use super::device_policy_manager::DevicePolicyManager;
use super::{Error, PolicyEngine, State};
use crate::protocol_layer::ProtocolError;
use crate::protocol_layer::message::Payload;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::request::PowerSource;
use crate::protocol_layer::message::data::source_capabilities::SourceCapabilities;
use crate::protocol_layer::message::header::{ControlMessageType, DataMessageType, MessageType};
use crate::timers::{Timer, TimerType};
use crate::type_c::power;
use crate::Sop;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Sink {
    Startup,
    Discovery,
    WaitForCapabilities,
    EvaluateCapability(SourceCapabilities),
    SelectCapability(PowerSource),
    TransitionSink(PowerSource),
    Ready,
    HardReset,
    TransitionToDefault,
    GiveSinkCap,
    GetSourceCap,
}

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    pub(super) async fn update_sink_state(&mut self, sink: &Sink) -> Result<State, Error> {
        let new_state = match sink {
            Sink::Startup => {
                self.protocol_layer.reset();
                self.port.contract = None;
                self.port.flags.explicit_contract = false;
                self.port.flags.wait_received = false;
                self.port.flags.power_role_swap = false;

                self.update_message_header().await?;
                State::Snk(Sink::Discovery)
            }
            Sink::Discovery => {
                self.protocol_layer.driver().wait_for_vbus(VbusLevel::Present).await?;
                self.port.source_capabilities = None;

                State::Snk(Sink::WaitForCapabilities)
            }
            Sink::WaitForCapabilities => {
                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Data(DataMessageType::SourceCapabilities)],
                        TimerType::SinkWaitCap,
                    )
                    .await?;

                let Some(Payload::Data(Data::SourceCapabilities(capabilities))) = message.payload else {
                    return Err(ProtocolError::UnexpectedMessage.into());
                };

                State::Snk(Sink::EvaluateCapability(capabilities))
            }
            Sink::EvaluateCapability(capabilities) => {
                self.port.flags.pd_connected = true;
                self.hard_reset_counter.reset();
                self.update_message_header().await?;

                self.device_policy_manager.inform_source_capabilities(capabilities).await;
                let request = self.device_policy_manager.request(capabilities).await;
                self.port.source_capabilities = Some(capabilities.clone());

                State::Snk(Sink::SelectCapability(request))
            }
            Sink::SelectCapability(power_source) => {
                self.protocol_layer
                    .transmit_data(Sop::Sop, Data::Request(power_source.to_raw()))
                    .await?;

                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[
                            MessageType::Control(ControlMessageType::Accept),
                            MessageType::Control(ControlMessageType::Wait),
                            MessageType::Control(ControlMessageType::Reject),
                        ],
                        TimerType::SenderResponse,
                    )
                    .await?;

                match (self.port.flags.explicit_contract, message.header.message_type()) {
                    (_, MessageType::Control(ControlMessageType::Accept)) => State::Snk(Sink::TransitionSink(*power_source)),
                    (false, _) => State::Snk(Sink::WaitForCapabilities),
                    (true, MessageType::Control(ControlMessageType::Wait)) => {
                        self.port.flags.wait_received = true;
                        State::Snk(Sink::Ready)
                    }
                    (true, _) => State::Snk(Sink::Ready),
                }
            }
            Sink::TransitionSink(power_source) => {
                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::PsRdy)],
                        TimerType::PSTransition,
                    )
                    .await?;

                self.device_policy_manager.transition_power(power_source).await;

                info!("Explicit contract for object position {}", power_source.object_position());
                self.port.contract = Some(*power_source);
                self.port.flags.explicit_contract = true;
                self.port.flags.wait_received = false;

                if self.config.fast_role_swap {
                    self.protocol_layer.driver().set_frs_enable(true).await?;
                }

                State::Snk(Sink::Ready)
            }
            Sink::Ready => self.ready().await?,
            Sink::HardReset => {
                if self.hard_reset_counter.increment().is_err() {
                    error!("Source does not respond to hard resets");
                    self.set_pd_disconnected();
                    return Err(Error::PortPartnerUnresponsive);
                }

                self.protocol_layer.hard_reset().await?;

                State::Snk(Sink::TransitionToDefault)
            }
            Sink::TransitionToDefault => {
                self.device_policy_manager.hard_reset().await;

                if self.port.flags.bist_test_data {
                    self.protocol_layer.driver().set_bist_test_mode(false).await?;
                }
                self.clear_after_hard_reset();
                self.port.flags.vconn_source = false;

                let revision = self.revision();
                power::sink_hard_reset::<PORT, TIMER>(self.protocol_layer.driver(), revision).await?;

                State::Snk(Sink::Startup)
            }
            Sink::GiveSinkCap => {
                let capabilities = self.device_policy_manager.sink_capabilities();
                self.protocol_layer
                    .transmit_data(Sop::Sop, Data::SinkCapabilities(capabilities))
                    .await?;

                self.ready_state()
            }
            Sink::GetSourceCap => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::GetSourceCap)
                    .await?;

                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Data(DataMessageType::SourceCapabilities)],
                        TimerType::SenderResponse,
                    )
                    .await?;

                match message.payload {
                    Some(Payload::Data(Data::SourceCapabilities(capabilities))) => {
                        State::Snk(Sink::EvaluateCapability(capabilities))
                    }
                    _ => self.ready_state(),
                }
            }
        };

        Ok(new_state)
    }
}
