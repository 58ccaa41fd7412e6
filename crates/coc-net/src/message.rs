use coc_dag::{CocNode, DeletionToken};
use coc_identity::PeerId;
use serde::{Deserialize, Serialize};

use crate::error::NetResult;

/// One message in flight between two peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: PeerId,
    pub recipient_id: PeerId,
    pub payload: Payload,
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "content", rename_all = "snake_case")]
pub enum Payload {
    /// A custody hop plus the (possibly sealed) content it carries
    CocData {
        node: CocNode,
        #[serde(with = "hex::serde")]
        content: Vec<u8>,
    },
    /// A revocation for one hop
    DeletionToken(DeletionToken),
}

impl Payload {
    /// Wire name of the message type
    pub fn message_type(&self) -> &'static str {
        match self {
            Payload::CocData { .. } => "coc_data",
            Payload::DeletionToken(_) => "deletion_token",
        }
    }
}

impl Envelope {
    pub fn new(sender_id: PeerId, recipient_id: PeerId, payload: Payload) -> Self {
        Self {
            sender_id,
            recipient_id,
            payload,
        }
    }

    pub fn message_type(&self) -> &'static str {
        self.payload.message_type()
    }

    /// Serialize to a JSON frame
    pub fn encode(&self) -> NetResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a JSON frame
    pub fn decode(frame: &[u8]) -> NetResult<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}
