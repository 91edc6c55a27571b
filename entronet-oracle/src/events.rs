use blake3::Hasher;
use entronet_fhe::Address;
use serde::{Deserialize, Serialize};

/// Hash of an identity-bearing value. Events never carry the plaintext.
pub type EventDigest = [u8; 32];

/// Observable notifications emitted by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OracleEvent {
    EntropyRequested {
        request_id: u64,
        consumer_hash: EventDigest,
        tag_hash: EventDigest,
        fee_paid: u128,
    },
    EntropyFulfilled {
        request_id: u64,
        consumer_hash: EventDigest,
        tag_hash: EventDigest,
    },
    FeeRecipientUpdated {
        previous: Address,
        current: Address,
    },
    ChaosEngineUpdated {
        previous: Address,
        current: Address,
    },
    AdminTransferred {
        previous: Address,
        current: Address,
    },
    EmergencyWithdrawal {
        to: Address,
        amount: u128,
    },
}

impl OracleEvent {
    pub fn request_id(&self) -> Option<u64> {
        match self {
            OracleEvent::EntropyRequested { request_id, .. }
            | OracleEvent::EntropyFulfilled { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

pub fn hash_consumer(consumer: &Address) -> EventDigest {
    digest(b"entronet/event/consumer", consumer.as_bytes())
}

pub fn hash_tag(tag: &[u8]) -> EventDigest {
    digest(b"entronet/event/tag", tag)
}

fn digest(domain: &[u8], bytes: &[u8]) -> EventDigest {
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(hasher.finalize().as_bytes());
    out
}
