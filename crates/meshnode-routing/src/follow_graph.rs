//! # Follow-Graph Router
//!
//! Ingests signed follow events and maintains an address-prefix to
//! peer-ID mapping derived from them. Only the most recent valid event
//! per author is authoritative — an out-of-order arrival is a
//! last-writer-wins replacement, never a merge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshnode_core::{Address, CanonicalBytes, ExecutionDigest, PeerId, Timestamp};
use meshnode_crypto::{sha256_canonical, verify_with_public_key, Ed25519PublicKey, Ed25519Signature};

/// A signed follow-list event: binds a peer public key to the
/// hierarchical addresses it should be treated as the next hop for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEvent {
    pub author: Ed25519PublicKey,
    pub kind: String,
    pub created_at: Timestamp,
    pub addresses: Vec<Address>,
    pub next_hop: PeerId,
    pub signature: Ed25519Signature,
}

impl FollowEvent {
    /// The content this event's signature was computed over: everything
    /// except the signature itself.
    fn signing_payload(&self) -> Result<CanonicalBytes, meshnode_core::error::CanonicalizationError> {
        let value = serde_json::json!({
            "author": self.author,
            "kind": self.kind,
            "createdAt": self.created_at,
            "addresses": self.addresses,
            "nextHop": self.next_hop,
        });
        CanonicalBytes::new(&value)
    }

    /// Content digest used for dedup/logging.
    pub fn digest(&self) -> Result<ExecutionDigest, FollowGraphError> {
        let payload = self.signing_payload()?;
        Ok(sha256_canonical(&payload))
    }
}

#[derive(Error, Debug)]
pub enum FollowGraphError {
    #[error("unrecognized event kind {0:?}, expected \"follow-list\"")]
    WrongKind(String),
    #[error("signature verification failed")]
    BadSignature,
    #[error(transparent)]
    Canonicalization(#[from] meshnode_core::error::CanonicalizationError),
}

const FOLLOW_LIST_KIND: &str = "follow-list";

/// Router state built from accepted follow events.
#[derive(Debug, Default)]
pub struct FollowGraphRouter {
    /// Most recent authoritative event per author.
    by_author: HashMap<Ed25519PublicKey, FollowEvent>,
    /// Address → next hop, rebuilt from `by_author` on every accepted event.
    mapping: HashMap<Address, PeerId>,
}

impl FollowGraphRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and ingest a follow event. Replaces any prior
    /// authoritative event from the same author, then rebuilds the
    /// mapping. Non-`follow-list` kinds are rejected (maps to F99 at
    /// the caller).
    pub fn update_from_follow_event(&mut self, event: FollowEvent) -> Result<(), FollowGraphError> {
        if event.kind != FOLLOW_LIST_KIND {
            return Err(FollowGraphError::WrongKind(event.kind));
        }
        let payload = event.signing_payload()?;
        verify_with_public_key(&payload, &event.signature, &event.author)
            .map_err(|_| FollowGraphError::BadSignature)?;

        let is_newer = match self.by_author.get(&event.author) {
            Some(existing) => event.created_at > existing.created_at,
            None => true,
        };
        if !is_newer {
            return Ok(());
        }

        self.by_author.insert(event.author.clone(), event);
        self.rebuild_mapping();
        Ok(())
    }

    fn rebuild_mapping(&mut self) {
        self.mapping.clear();
        for event in self.by_author.values() {
            for address in &event.addresses {
                self.mapping.insert(address.clone(), event.next_hop.clone());
            }
        }
    }

    pub fn get_next_hop(&self, address: &Address) -> Option<&PeerId> {
        self.mapping.get(address)
    }

    pub fn get_follow_by_pubkey(&self, pubkey: &Ed25519PublicKey) -> Option<&FollowEvent> {
        self.by_author.get(pubkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnode_crypto::Ed25519KeyPair;

    fn signed_event(kp: &Ed25519KeyPair, addresses: &[&str], hop: &str, at: Timestamp) -> FollowEvent {
        let mut event = FollowEvent {
            author: kp.public_key(),
            kind: FOLLOW_LIST_KIND.to_string(),
            created_at: at,
            addresses: addresses.iter().map(|a| Address::parse(*a).unwrap()).collect(),
            next_hop: PeerId::new(hop),
            signature: Ed25519Signature::from_bytes([0u8; 64]),
        };
        let payload = event.signing_payload().unwrap();
        event.signature = kp.sign(&payload);
        event
    }

    #[test]
    fn accepts_well_signed_follow_list_event() {
        let kp = Ed25519KeyPair::generate();
        let mut router = FollowGraphRouter::new();
        let event = signed_event(&kp, &["g.agent.alice"], "peer-a", Timestamp::now());
        router.update_from_follow_event(event).unwrap();
        let addr = Address::parse("g.agent.alice").unwrap();
        assert_eq!(router.get_next_hop(&addr).unwrap().as_str(), "peer-a");
    }

    #[test]
    fn rejects_wrong_kind() {
        let kp = Ed25519KeyPair::generate();
        let mut event = signed_event(&kp, &["g.agent.alice"], "peer-a", Timestamp::now());
        event.kind = "other-kind".to_string();
        let mut router = FollowGraphRouter::new();
        let err = router.update_from_follow_event(event).unwrap_err();
        assert!(matches!(err, FollowGraphError::WrongKind(_)));
    }

    #[test]
    fn rejects_bad_signature() {
        let kp = Ed25519KeyPair::generate();
        let other = Ed25519KeyPair::generate();
        let mut event = signed_event(&kp, &["g.agent.alice"], "peer-a", Timestamp::now());
        event.author = other.public_key();
        let mut router = FollowGraphRouter::new();
        let err = router.update_from_follow_event(event).unwrap_err();
        assert!(matches!(err, FollowGraphError::BadSignature));
    }

    #[test]
    fn newer_event_replaces_older_for_same_author() {
        let kp = Ed25519KeyPair::generate();
        let mut router = FollowGraphRouter::new();
        let t0 = Timestamp::now();
        let t1 = t0.plus_seconds(10);

        router
            .update_from_follow_event(signed_event(&kp, &["g.agent.alice"], "peer-old", t0))
            .unwrap();
        router
            .update_from_follow_event(signed_event(&kp, &["g.agent.alice"], "peer-new", t1))
            .unwrap();

        let addr = Address::parse("g.agent.alice").unwrap();
        assert_eq!(router.get_next_hop(&addr).unwrap().as_str(), "peer-new");
    }

    #[test]
    fn out_of_order_older_event_is_ignored() {
        let kp = Ed25519KeyPair::generate();
        let mut router = FollowGraphRouter::new();
        let t0 = Timestamp::now();
        let t1 = t0.plus_seconds(10);

        router
            .update_from_follow_event(signed_event(&kp, &["g.agent.alice"], "peer-new", t1))
            .unwrap();
        router
            .update_from_follow_event(signed_event(&kp, &["g.agent.alice"], "peer-old", t0))
            .unwrap();

        let addr = Address::parse("g.agent.alice").unwrap();
        assert_eq!(router.get_next_hop(&addr).unwrap().as_str(), "peer-new");
    }

    #[test]
    fn get_follow_by_pubkey_returns_authoritative_event() {
        let kp = Ed25519KeyPair::generate();
        let mut router = FollowGraphRouter::new();
        let event = signed_event(&kp, &["g.agent.alice"], "peer-a", Timestamp::now());
        router.update_from_follow_event(event).unwrap();
        assert!(router.get_follow_by_pubkey(&kp.public_key()).is_some());
    }
}
