//! Structured VDM states of the policy engine, for discovery of the port partner and cable.
use heapless::Vec;
use tcpm_traits::PortController;

use super::device_policy_manager::DevicePolicyManager;
use super::shared::Shared;
use super::{Error, PolicyEngine, State};
use crate::protocol_layer::message::Payload;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::data::vendor_defined::{
    Identity, PD_SID, VdmCommand, VdmCommandType, VdmHeader, VdmHeaderStructured, VendorDefined, pack_svids,
    unpack_svids,
};
use crate::protocol_layer::message::header::{DataMessageType, MessageType};
use crate::timers::{Timer, TimerType};
use crate::{Sop, SpecificationRevision};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Vdm {
    IdentityRequest(Sop),
    SvidsRequest,
    ModesRequest(u16),
    /// Answer a VDM of the port partner.
    Response(VendorDefined),
}

impl<PORT: PortController, TIMER: Timer, DPM: DevicePolicyManager> PolicyEngine<PORT, TIMER, DPM> {
    /// Send a structured VDM request, and wait for the answer of the responder.
    ///
    /// Returns the command type of the answer, and its VDOs.
    async fn vdm_request(
        &mut self,
        sop: Sop,
        svid: u16,
        command: VdmCommand,
    ) -> Result<(VdmCommandType, Vec<u32, 6>), Error> {
        let header = VdmHeaderStructured::new(
            svid,
            command,
            VdmCommandType::InitiatorReq,
            self.protocol_layer.revision(sop),
        );

        self.protocol_layer
            .transmit_data(
                sop,
                Data::VendorDefined(VendorDefined::new(VdmHeader::Structured(header), &[])),
            )
            .await?;

        loop {
            let message = self
                .protocol_layer
                .receive_message_type(
                    sop,
                    &[MessageType::Data(DataMessageType::VendorDefined)],
                    TimerType::VDMSenderResponse,
                )
                .await?;

            let Some(Payload::Data(Data::VendorDefined(vdm))) = message.payload else {
                continue;
            };

            match vdm.structured() {
                Some(response) if response.command() == command => {
                    return Ok((response.command_type(), vdm.objects));
                }
                _ => debug!("Ignore unrelated VDM"),
            }
        }
    }

    pub(super) async fn update_vdm_state(&mut self, vdm: &Vdm) -> Result<State, Error> {
        let new_state = match vdm {
            Vdm::IdentityRequest(sop) => {
                if self.discover_identity_counter.attempt().is_err() {
                    return Ok(self.ready_state());
                }

                let (command_type, objects) = self.vdm_request(*sop, PD_SID, VdmCommand::DiscoverIdentity).await?;
                let identity = match command_type {
                    VdmCommandType::ResponderAck => Identity::from_objects(&objects),
                    _ => None,
                };

                match (command_type, identity) {
                    (_, Some(identity)) if *sop == Sop::Sop => {
                        info!("Partner identity, VID {:04x}", identity.id_header.vid());
                        let modal = identity.id_header.modal_operation();
                        self.port.partner_identity = Some(identity);

                        match modal {
                            true => State::Vdm(Vdm::SvidsRequest),
                            false => self.ready_state(),
                        }
                    }
                    (_, Some(_identity)) => {
                        info!("Cable identity, VID {:04x}", _identity.id_header.vid());
                        self.ready_state()
                    }
                    (VdmCommandType::ResponderBusy, None) => self.ready_state(),
                    _ => {
                        debug!("Identity discovery on {:?} NAKed", sop);
                        let max = self.discover_identity_counter.max_value();
                        self.discover_identity_counter.set(max);
                        self.ready_state()
                    }
                }
            }
            Vdm::SvidsRequest => {
                let (command_type, objects) = self.vdm_request(Sop::Sop, PD_SID, VdmCommand::DiscoverSvids).await?;
                if command_type != VdmCommandType::ResponderAck {
                    return Ok(self.ready_state());
                }

                self.port.partner_svids = unpack_svids(&objects);
                match self.port.partner_svids.first() {
                    Some(&svid) => State::Vdm(Vdm::ModesRequest(svid)),
                    None => self.ready_state(),
                }
            }
            Vdm::ModesRequest(svid) => {
                let (command_type, _modes) = self.vdm_request(Sop::Sop, *svid, VdmCommand::DiscoverModes).await?;
                if command_type == VdmCommandType::ResponderAck {
                    debug!("SVID {:04x} has modes {:?}", svid, _modes.as_slice());
                }

                self.ready_state()
            }
            Vdm::Response(request) => {
                let Some(header) = request.structured() else {
                    // Unstructured VDMs are not supported, and silently dropped before PD 3.0.
                    return Ok(match self.revision() {
                        SpecificationRevision::R3_X => State::Shared(Shared::SendNotSupported),
                        _ => self.ready_state(),
                    });
                };

                if header.command_type() != VdmCommandType::InitiatorReq {
                    debug!("Drop unsolicited VDM response");
                    return Ok(self.ready_state());
                }

                let mut objects: Vec<u32, 6> = Vec::new();
                let acknowledged = match (header.standard_or_vid(), header.command()) {
                    (_, VdmCommand::Attention) => return Ok(self.ready_state()),
                    (PD_SID, VdmCommand::DiscoverIdentity) => match self.device_policy_manager.identity() {
                        Some(identity) => {
                            objects = identity.to_objects();
                            true
                        }
                        None => false,
                    },
                    (PD_SID, VdmCommand::DiscoverSvids) => {
                        let svids = self.device_policy_manager.svids();
                        objects = pack_svids(&svids);
                        !svids.is_empty()
                    }
                    (svid, VdmCommand::DiscoverModes) => {
                        objects = self.device_policy_manager.modes(svid);
                        !objects.is_empty()
                    }
                    _ => false,
                };

                let command_type = match acknowledged {
                    true => VdmCommandType::ResponderAck,
                    false => VdmCommandType::ResponderNak,
                };
                let response = header.response(command_type, self.revision());

                self.protocol_layer
                    .transmit_data(
                        Sop::Sop,
                        Data::VendorDefined(VendorDefined::new(VdmHeader::Structured(response), &objects)),
                    )
                    .await?;

                self.ready_state()
            }
        };

        Ok(new_state)
    }
}
