//! Source states of the policy engine.
use tcpm_traits::PortController;

use super::device_policy_manager::{DevicePolicyManager, Response};
use super::{Error, PolicyEngine, State};
use crate::protocol_layer::ProtocolError;
use crate::protocol_layer::message::Payload;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::request::{PowerSource, RawRequest};
use crate::protocol_layer::message::header::{ControlMessageType, DataMessageType, MessageType};
use crate::timers::{Timer, TimerType};
use crate::type_c::power;
use crate::{PowerRole, Sop};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Source {
    Startup,
    Discovery,
    SendCapabilities,
    NegotiateCapability(RawRequest),
    TransitionSupply(PowerSource),
    Ready,
    Disabled,
    CapabilityResponse(Response),
    HardReset,
    HardResetReceived,
    TransitionToDefault,
    GetSinkCap,
    GiveSourceCap,
    /// A Ping was received, which needs no answer.
    Ping,
}

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    pub(super) async fn update_source_state(&mut self, source: &Source) -> Result<State, Error> {
        let new_state = match source {
            Source::Startup => {
                self.protocol_layer.reset();
                self.caps_counter.reset();
                self.port.contract = None;
                self.port.flags.explicit_contract = false;
                self.port.flags.sink_tx_ok = false;

                let capabilities = self.device_policy_manager.source_capabilities();
                if let Err(_reason) = capabilities.validate() {
                    error!("Refuse to offer invalid source capabilities: {:?}", _reason);
                    return Ok(State::Src(Source::Disabled));
                }
                self.advertised_capabilities = Some(capabilities);

                if self.port.flags.power_role_swap {
                    self.port.flags.power_role_swap = false;
                    TimerType::new::<TIMER>(TimerType::SwapSourceStart).await;
                }

                self.update_message_header().await?;
                State::Src(Source::Discovery)
            }
            Source::Discovery => {
                if self.caps_counter.value() > 0 {
                    TimerType::new::<TIMER>(TimerType::SendSourceCap).await;
                }

                State::Src(Source::SendCapabilities)
            }
            Source::SendCapabilities => {
                let capabilities = self
                    .advertised_capabilities
                    .get_or_insert_with(|| self.device_policy_manager.source_capabilities())
                    .clone();

                match self
                    .protocol_layer
                    .transmit_data(Sop::Sop, Data::SourceCapabilities(capabilities))
                    .await
                {
                    Err(ProtocolError::TransmitRetriesExceeded(_)) if !self.port.flags.pd_connected => {
                        if self.caps_counter.increment().is_err() {
                            info!("No answer to source capabilities, disable PD");
                            return Ok(State::Src(Source::Disabled));
                        }

                        return Ok(State::Src(Source::Discovery));
                    }
                    result => result?,
                }

                self.port.flags.pd_connected = true;
                self.hard_reset_counter.reset();
                self.caps_counter.reset();

                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Data(DataMessageType::Request)],
                        TimerType::SenderResponse,
                    )
                    .await?;

                let Some(Payload::Data(Data::Request(request))) = message.payload else {
                    return Err(ProtocolError::UnexpectedMessage.into());
                };

                self.update_message_header().await?;
                State::Src(Source::NegotiateCapability(request))
            }
            Source::NegotiateCapability(request) => {
                let capabilities = self.advertised_capabilities.clone().unwrap_or_default();

                match PowerSource::from_raw(*request, &capabilities) {
                    None => {
                        warn!("Request for unknown object position {}", request.object_position());
                        State::Src(Source::CapabilityResponse(Response::Reject))
                    }
                    Some(power_source) => {
                        match self
                            .device_policy_manager
                            .evaluate_request(&power_source, &capabilities)
                            .await
                        {
                            Response::Accept => State::Src(Source::TransitionSupply(power_source)),
                            response => State::Src(Source::CapabilityResponse(response)),
                        }
                    }
                }
            }
            Source::TransitionSupply(power_source) => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::Accept)
                    .await?;

                TimerType::new::<TIMER>(TimerType::SrcTransition).await;
                self.device_policy_manager.transition_supply(power_source).await;

                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::PsRdy)
                    .await?;

                info!("Explicit contract for object position {}", power_source.object_position());
                self.port.contract = Some(*power_source);
                self.port.flags.explicit_contract = true;

                State::Src(Source::Ready)
            }
            Source::CapabilityResponse(response) => {
                let message_type = match response {
                    Response::Wait => ControlMessageType::Wait,
                    Response::Accept | Response::Reject => ControlMessageType::Reject,
                };
                self.protocol_layer.transmit_control(Sop::Sop, message_type).await?;

                if self.port.flags.explicit_contract {
                    State::Src(Source::Ready)
                } else {
                    State::Src(Source::HardReset)
                }
            }
            Source::Ready => {
                self.advertise_sink_tx_ok().await?;
                self.ready().await?
            }
            Source::Disabled => {
                let (_sop, _message) = self.protocol_layer.receive().await?;
                debug!("PD disabled, drop {:?}", _message.header.message_type());

                State::Src(Source::Disabled)
            }
            Source::HardReset => {
                if self.hard_reset_counter.increment().is_err() {
                    return if self.port.flags.pd_connected {
                        error!("Sink does not respond to hard resets");
                        Err(Error::ErrorRecovery)
                    } else {
                        info!("Sink does not speak PD");
                        Ok(State::Src(Source::Disabled))
                    };
                }

                self.protocol_layer.hard_reset().await?;
                TimerType::new::<TIMER>(TimerType::PSHardReset).await;

                State::Src(Source::TransitionToDefault)
            }
            Source::HardResetReceived => {
                TimerType::new::<TIMER>(TimerType::PSHardReset).await;

                State::Src(Source::TransitionToDefault)
            }
            Source::TransitionToDefault => {
                self.device_policy_manager.hard_reset().await;

                if self.port.flags.bist_test_data {
                    self.protocol_layer.driver().set_bist_test_mode(false).await?;
                }
                self.clear_after_hard_reset();

                let (rp_value, vconn, revision) = (self.config.rp_value, self.default_vconn_source, self.revision());
                power::source_hard_reset::<PORT, TIMER>(self.protocol_layer.driver(), rp_value, vconn, revision)
                    .await?;
                self.port.flags.vconn_source = vconn;

                State::Src(Source::Startup)
            }
            Source::GetSinkCap => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::GetSinkCap)
                    .await?;

                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[
                            MessageType::Data(DataMessageType::SinkCapabilities),
                            MessageType::Control(ControlMessageType::NotSupported),
                            MessageType::Control(ControlMessageType::Reject),
                        ],
                        TimerType::SenderResponse,
                    )
                    .await?;

                if let Some(Payload::Data(Data::SinkCapabilities(capabilities))) = message.payload {
                    self.device_policy_manager
                        .inform_sink_capabilities(&capabilities)
                        .await;
                    self.port.sink_capabilities = Some(capabilities);
                }

                self.ready_state()
            }
            Source::GiveSourceCap => {
                let capabilities = match self.port.power_role {
                    PowerRole::Source => self
                        .advertised_capabilities
                        .get_or_insert_with(|| self.device_policy_manager.source_capabilities())
                        .clone(),
                    PowerRole::Sink => self.device_policy_manager.source_capabilities(),
                };

                self.protocol_layer
                    .transmit_data(Sop::Sop, Data::SourceCapabilities(capabilities))
                    .await?;

                self.ready_state()
            }
            Source::Ping => {
                trace!("Ping");
                self.ready_state()
            }
        };

        Ok(new_state)
    }
}
