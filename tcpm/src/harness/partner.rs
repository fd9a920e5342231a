//! The port partner, which builds frames and decodes what the port sent.
use std::vec::Vec;

use super::tcpc::{Action, Frame, Transmission};
use crate::protocol_layer::message::Message;
use crate::protocol_layer::message::data::Data;
use crate::protocol_layer::message::extended::Extended;
use crate::protocol_layer::message::extended::chunked::ChunkedMessageSender;
use crate::protocol_layer::message::header::{ControlMessageType, Header};
use crate::{DataRole, PowerRole, Sop, SpecificationRevision};

pub struct Partner {
    template: Header,
    message_id: u8,
}

impl Partner {
    pub fn new(power_role: PowerRole, revision: SpecificationRevision) -> Self {
        let data_role = match power_role {
            PowerRole::Source => DataRole::Dfp,
            PowerRole::Sink => DataRole::Ufp,
        };

        Self {
            template: Header::new_template(data_role, power_role, revision),
            message_id: 0,
        }
    }

    fn next_message_id(&mut self) -> u8 {
        let message_id = self.message_id;
        self.message_id = (message_id + 1) % 8;
        message_id
    }

    /// Start over with message ID zero, as after a reset.
    pub fn reset(&mut self) {
        self.message_id = 0;
    }

    /// Take over the roles that a swap gave the partner.
    pub fn set_roles(&mut self, power_role: PowerRole, data_role: DataRole) {
        self.template = self.template.with_port_power_role(power_role).with_port_data_role(data_role);
    }

    pub fn control(&mut self, message_type: ControlMessageType) -> Frame {
        let mut buf = [0u8; 2];
        Header::new_control(self.template, self.next_message_id(), message_type).to_bytes(&mut buf);
        buf.to_vec()
    }

    pub fn data(&mut self, data: Data) -> Frame {
        let header = Header::new_data(
            self.template,
            self.next_message_id(),
            data.message_type(),
            data.num_objects(),
        );

        let mut buf = [0u8; 30];
        let len = Message::new_with_data(header, data).to_bytes(&mut buf);
        buf[..len].to_vec()
    }

    /// A single chunk of an extended message.
    pub fn chunk(&mut self, extended: &Extended, chunk_number: u8) -> Frame {
        let mut payload = [0u8; 260];
        let size = extended.to_bytes(&mut payload);
        let sender = ChunkedMessageSender::new(&payload[..size]);

        let header = Header::new_extended(self.template, self.next_message_id(), extended.message_type(), 0);
        let mut buf = [0u8; 30];
        let len = sender.frame_chunk(header, chunk_number, &mut buf);
        buf[..len].to_vec()
    }

    /// A control message, as a scheduled reply.
    pub fn reply_control(&mut self, delay: u64, message_type: ControlMessageType) -> (u64, Action) {
        (delay, Action::Receive(Sop::Sop, self.control(message_type)))
    }

    /// A data message, as a scheduled reply.
    pub fn reply_data(&mut self, delay: u64, data: Data) -> (u64, Action) {
        (delay, Action::Receive(Sop::Sop, self.data(data)))
    }
}

/// Decode the SOP messages among transmissions.
pub fn decode(transmissions: &[Transmission]) -> Vec<Message> {
    transmissions
        .iter()
        .filter(|transmission| transmission.message_type().is_some())
        .map(|transmission| Message::from_bytes(&transmission.data).unwrap())
        .collect()
}
