//! Role swap states of the policy engine: data role, power role, fast role and VCONN swaps.
use embassy_futures::select::{Either, select};
use tcpm_traits::{CcPull, PortController, VbusLevel, VbusSource};

use super::device_policy_manager::{DevicePolicyManager, Response};
use super::sink::Sink;
use super::source::Source;
use super::{Error, PolicyEngine, State};
use crate::protocol_layer::message::header::{ControlMessageType, MessageType};
use crate::timers::{Timer, TimerType};
use crate::{DataRole, PowerRole, Sop};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Swap {
    DrsEvaluateSwap,
    DrsSendSwap,
    PrsSrcSnkEvaluateSwap,
    PrsSrcSnkSendSwap,
    PrsSrcSnkTransitionToOff,
    PrsSrcSnkWaitSourceOn,
    PrsSnkSrcEvaluateSwap,
    PrsSnkSrcSendSwap,
    PrsSnkSrcTransitionToOff,
    PrsSnkSrcSourceOn,
    VcsEvaluateSwap,
    VcsSendSwap,
    VcsWaitForVconn,
    VcsTurnOnVconn,
    /// Fast role swap, as the initial sink.
    FrsSnkSrcStart,
}

/// Message types that answer a swap request.
const SWAP_RESPONSES: [MessageType; 3] = [
    MessageType::Control(ControlMessageType::Accept),
    MessageType::Control(ControlMessageType::Reject),
    MessageType::Control(ControlMessageType::Wait),
];

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    /// Send a swap request, and wait for its answer.
    async fn request_swap(&mut self, message_type: ControlMessageType) -> Result<Response, Error> {
        self.protocol_layer.transmit_control(Sop::Sop, message_type).await?;

        let message = self
            .protocol_layer
            .receive_message_type(Sop::Sop, &SWAP_RESPONSES, TimerType::SenderResponse)
            .await?;

        Ok(match message.header.message_type() {
            MessageType::Control(ControlMessageType::Accept) => Response::Accept,
            MessageType::Control(ControlMessageType::Wait) => Response::Wait,
            _ => Response::Reject,
        })
    }

    /// Send the answer to a swap request.
    async fn answer_swap(&mut self, response: Response) -> Result<(), Error> {
        let message_type = match response {
            Response::Accept => ControlMessageType::Accept,
            Response::Reject => ControlMessageType::Reject,
            Response::Wait => ControlMessageType::Wait,
        };

        self.protocol_layer.transmit_control(Sop::Sop, message_type).await?;
        Ok(())
    }

    async fn swap_data_role(&mut self) -> Result<(), Error> {
        let data_role = match self.port.data_role {
            DataRole::Dfp => DataRole::Ufp,
            DataRole::Ufp => DataRole::Dfp,
        };

        self.set_data_role(data_role).await
    }

    pub(super) async fn update_swap_state(&mut self, swap: &Swap) -> Result<State, Error> {
        let new_state = match swap {
            Swap::DrsEvaluateSwap => {
                if self.port.flags.modal_operation {
                    warn!("DR_Swap in modal operation");
                    return Ok(self.hard_reset_state());
                }

                let response = match self.config.dual_role_data {
                    true => self.device_policy_manager.evaluate_dr_swap().await,
                    false => Response::Reject,
                };
                self.answer_swap(response).await?;

                if response == Response::Accept {
                    self.swap_data_role().await?;
                }

                self.ready_state()
            }
            Swap::DrsSendSwap => {
                if self.dr_swap_counter.attempt().is_err() {
                    warn!("Give up on data role swaps");
                    return Ok(self.ready_state());
                }

                if self.request_swap(ControlMessageType::DrSwap).await? == Response::Accept {
                    self.dr_swap_counter.reset();
                    self.swap_data_role().await?;
                }

                self.ready_state()
            }
            Swap::PrsSrcSnkEvaluateSwap | Swap::PrsSnkSrcEvaluateSwap => {
                let response = match self.config.dual_role_power {
                    true => self.device_policy_manager.evaluate_pr_swap().await,
                    false => Response::Reject,
                };
                self.answer_swap(response).await?;

                match (response, swap) {
                    (Response::Accept, Swap::PrsSrcSnkEvaluateSwap) => State::Swap(Swap::PrsSrcSnkTransitionToOff),
                    (Response::Accept, _) => State::Swap(Swap::PrsSnkSrcTransitionToOff),
                    _ => self.ready_state(),
                }
            }
            Swap::PrsSrcSnkSendSwap => match self.request_swap(ControlMessageType::PrSwap).await? {
                Response::Accept => State::Swap(Swap::PrsSrcSnkTransitionToOff),
                _ => self.ready_state(),
            },
            Swap::PrsSnkSrcSendSwap => match self.request_swap(ControlMessageType::PrSwap).await? {
                Response::Accept => State::Swap(Swap::PrsSnkSrcTransitionToOff),
                _ => self.ready_state(),
            },
            Swap::PrsSrcSnkTransitionToOff => {
                self.port.flags.power_role_swap = true;
                self.port.flags.explicit_contract = false;
                TimerType::new::<TIMER>(TimerType::SrcTransition).await;

                let port_controller = self.protocol_layer.driver();
                port_controller.set_vbus_source(VbusSource::Off).await?;
                match select(
                    port_controller.wait_for_vbus(VbusLevel::Safe0V),
                    TimerType::new::<TIMER>(TimerType::PSSourceOff),
                )
                .await
                {
                    Either::First(result) => result?,
                    Either::Second(_) => return Err(Error::ErrorRecovery),
                }

                port_controller.set_cc(CcPull::Rd).await?;
                self.set_power_role(PowerRole::Sink).await?;

                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::PsRdy)
                    .await?;

                State::Swap(Swap::PrsSrcSnkWaitSourceOn)
            }
            Swap::PrsSrcSnkWaitSourceOn => {
                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::PsRdy)],
                        TimerType::PSSourceOn,
                    )
                    .await?;

                self.port.flags.power_role_swap = false;
                self.protocol_layer.driver().set_vbus_sink(true).await?;

                State::Snk(Sink::Startup)
            }
            Swap::PrsSnkSrcTransitionToOff => {
                self.port.flags.power_role_swap = true;
                self.port.flags.explicit_contract = false;
                self.protocol_layer.driver().set_vbus_sink(false).await?;

                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::PsRdy)],
                        TimerType::PSSourceOff,
                    )
                    .await?;

                State::Swap(Swap::PrsSnkSrcSourceOn)
            }
            Swap::PrsSnkSrcSourceOn => {
                let rp_value = self.config.rp_value;
                let port_controller = self.protocol_layer.driver();
                port_controller.set_cc(CcPull::Rp(rp_value)).await?;
                port_controller.set_vbus_source(VbusSource::Default).await?;

                match select(
                    port_controller.wait_for_vbus(VbusLevel::Present),
                    TimerType::new::<TIMER>(TimerType::SrcTurnOn),
                )
                .await
                {
                    Either::First(result) => result?,
                    Either::Second(_) => {
                        error!("VBUS did not come up as new source");
                        return Err(Error::ErrorRecovery);
                    }
                }

                self.set_power_role(PowerRole::Source).await?;
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::PsRdy)
                    .await?;

                // Source startup waits tSwapSourceStart while the swap flag is set.
                State::Src(Source::Startup)
            }
            Swap::VcsEvaluateSwap => {
                let response = match self.config.vconn_capable {
                    true => self.device_policy_manager.evaluate_vconn_swap().await,
                    false => Response::Reject,
                };
                self.answer_swap(response).await?;

                match (response, self.port.flags.vconn_source) {
                    (Response::Accept, true) => State::Swap(Swap::VcsWaitForVconn),
                    (Response::Accept, false) => State::Swap(Swap::VcsTurnOnVconn),
                    _ => self.ready_state(),
                }
            }
            Swap::VcsSendSwap => {
                if self.vconn_swap_counter.attempt().is_err() {
                    warn!("Give up on VCONN swaps");
                    return Ok(self.ready_state());
                }

                match (
                    self.request_swap(ControlMessageType::VconnSwap).await?,
                    self.port.flags.vconn_source,
                ) {
                    (Response::Accept, true) => State::Swap(Swap::VcsWaitForVconn),
                    (Response::Accept, false) => State::Swap(Swap::VcsTurnOnVconn),
                    _ => self.ready_state(),
                }
            }
            Swap::VcsWaitForVconn => {
                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::PsRdy)],
                        TimerType::VCONNSourceOn,
                    )
                    .await?;

                self.protocol_layer.driver().set_vconn(false).await?;
                self.port.flags.vconn_source = false;
                self.vconn_swap_counter.reset();

                self.ready_state()
            }
            Swap::VcsTurnOnVconn => {
                self.protocol_layer.driver().set_vconn(true).await?;
                TimerType::new::<TIMER>(TimerType::VCONNStable).await;
                self.port.flags.vconn_source = true;
                self.vconn_swap_counter.reset();

                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::PsRdy)
                    .await?;

                self.ready_state()
            }
            Swap::FrsSnkSrcStart => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::FrSwap)
                    .await?;

                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::Accept)],
                        TimerType::SenderResponse,
                    )
                    .await?;

                self.port.flags.power_role_swap = true;
                self.port.flags.explicit_contract = false;

                self.protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[MessageType::Control(ControlMessageType::PsRdy)],
                        TimerType::PSSourceOff,
                    )
                    .await?;

                let rp_value = self.config.rp_value;
                let port_controller = self.protocol_layer.driver();
                port_controller.set_frs_enable(false).await?;
                port_controller.set_cc(CcPull::Rp(rp_value)).await?;
                port_controller.set_vbus_source(VbusSource::Default).await?;

                self.set_power_role(PowerRole::Source).await?;
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::PsRdy)
                    .await?;

                State::Src(Source::Startup)
            }
        };

        Ok(new_state)
    }
}
