//! States that both power roles share: soft reset, BIST, Not_Supported handling and
//! the PD 3.x information exchange.
use tcpm_traits::PortController;

use super::device_policy_manager::DevicePolicyManager;
use super::sink::Sink;
use super::source::Source;
use super::{Error, PolicyEngine, State};
use crate::protocol_layer::message::Payload;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::alert::AlertDataObject;
use crate::protocol_layer::message::extended::Extended;
use crate::protocol_layer::message::header::{ControlMessageType, DataMessageType, MessageType};
use crate::timers::{Timer, TimerType};
use crate::{PowerRole, Sop, SpecificationRevision};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Shared {
    SendSoftReset(Sop),
    SoftReset,
    SendNotSupported,
    BistTx,
    BistTestData,
    GiveSourceCapExtended,
    GiveStatus,
    GiveBatteryCap(u8),
    GiveBatteryStatus(u8),
    GiveManufacturerInfo { target: u8, reference: u8 },
    GiveCountryCodes,
    GiveRevision,
    GetRevision,
    AlertReceived(AlertDataObject),
    SendAlert(AlertDataObject),
    /// A chunked message arrived, while chunking is not supported.
    ChunkReceived,
    WaitForErrorRecovery,
}

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    /// The state that follows a soft reset on SOP.
    fn after_soft_reset(&mut self) -> State {
        match self.port.power_role {
            PowerRole::Source => {
                self.caps_counter.reset();
                State::Src(Source::SendCapabilities)
            }
            PowerRole::Sink => State::Snk(Sink::WaitForCapabilities),
        }
    }

    /// Send an extended message, or Not_Supported if there is nothing to send.
    async fn give_extended(&mut self, extended: Option<Extended>) -> Result<State, Error> {
        match extended {
            Some(extended) if self.revision() >= SpecificationRevision::R3_X => {
                self.protocol_layer.transmit_extended(Sop::Sop, extended).await?;
                Ok(self.ready_state())
            }
            _ => Ok(State::Shared(Shared::SendNotSupported)),
        }
    }

    pub(super) async fn update_shared_state(&mut self, shared: &Shared) -> Result<State, Error> {
        let new_state = match shared {
            Shared::SendSoftReset(sop) => {
                self.protocol_layer.reset_sop(*sop);
                self.protocol_layer
                    .transmit_control(*sop, ControlMessageType::SoftReset)
                    .await?;

                self.protocol_layer
                    .receive_message_type(
                        *sop,
                        &[MessageType::Control(ControlMessageType::Accept)],
                        TimerType::SenderResponse,
                    )
                    .await?;

                match sop {
                    Sop::Sop => self.after_soft_reset(),
                    _ => self.ready_state(),
                }
            }
            Shared::SoftReset => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::Accept)
                    .await?;

                self.after_soft_reset()
            }
            Shared::SendNotSupported => {
                let message_type = self.not_supported();
                self.protocol_layer.transmit_control(Sop::Sop, message_type).await?;

                self.ready_state()
            }
            Shared::BistTx => {
                self.protocol_layer.driver().transmit_bist_carrier().await?;
                TimerType::new::<TIMER>(TimerType::BISTContMode).await;

                self.ready_state()
            }
            Shared::BistTestData => {
                if !self.port.flags.bist_test_data {
                    info!("Enter BIST test data mode");
                    self.protocol_layer.driver().set_bist_test_mode(true).await?;
                    self.port.flags.bist_test_data = true;
                }

                // Everything but a hard reset is ignored.
                let (_sop, _message) = self.protocol_layer.receive().await?;
                State::Shared(Shared::BistTestData)
            }
            Shared::GiveSourceCapExtended => {
                let extended = self
                    .device_policy_manager
                    .source_capabilities_extended()
                    .map(Extended::SourceCapabilitiesExtended);
                self.give_extended(extended).await?
            }
            Shared::GiveStatus => {
                let extended = self.device_policy_manager.status().map(Extended::Status);
                self.give_extended(extended).await?
            }
            Shared::GiveBatteryCap(reference) => {
                let extended = self
                    .device_policy_manager
                    .battery_capabilities(*reference)
                    .map(Extended::BatteryCapabilities);
                self.give_extended(extended).await?
            }
            Shared::GiveBatteryStatus(reference) => match self.device_policy_manager.battery_status(*reference) {
                Some(status) => {
                    self.protocol_layer
                        .transmit_data(Sop::Sop, Data::BatteryStatus(status))
                        .await?;
                    self.ready_state()
                }
                None => State::Shared(Shared::SendNotSupported),
            },
            Shared::GiveManufacturerInfo { target, reference } => {
                let extended = self
                    .device_policy_manager
                    .manufacturer_info(*target, *reference)
                    .map(Extended::ManufacturerInfo);
                self.give_extended(extended).await?
            }
            Shared::GiveCountryCodes => {
                let extended = self.device_policy_manager.country_codes().map(Extended::CountryCodes);
                self.give_extended(extended).await?
            }
            Shared::GiveRevision => {
                if self.revision() < SpecificationRevision::R3_X {
                    return Ok(State::Shared(Shared::SendNotSupported));
                }

                let revision = self.device_policy_manager.revision();
                self.protocol_layer
                    .transmit_data(Sop::Sop, Data::Revision(revision))
                    .await?;

                self.ready_state()
            }
            Shared::GetRevision => {
                self.protocol_layer
                    .transmit_control(Sop::Sop, ControlMessageType::GetRevision)
                    .await?;

                let message = self
                    .protocol_layer
                    .receive_message_type(
                        Sop::Sop,
                        &[
                            MessageType::Data(DataMessageType::Revision),
                            MessageType::Control(ControlMessageType::NotSupported),
                        ],
                        TimerType::SenderResponse,
                    )
                    .await?;

                if let Some(Payload::Data(Data::Revision(revision))) = message.payload {
                    debug!("Partner revision {:?}", revision);
                    self.port.partner_revision = Some(revision);
                }

                self.ready_state()
            }
            Shared::AlertReceived(alert) => {
                self.device_policy_manager.alert(*alert).await;
                self.ready_state()
            }
            Shared::SendAlert(alert) => {
                self.protocol_layer.transmit_data(Sop::Sop, Data::Alert(*alert)).await?;
                self.ready_state()
            }
            Shared::ChunkReceived => {
                TimerType::new::<TIMER>(TimerType::ChunkingNotSupported).await;
                State::Shared(Shared::SendNotSupported)
            }
            Shared::WaitForErrorRecovery => return Err(Error::ErrorRecovery),
        };

        Ok(new_state)
    }
}
