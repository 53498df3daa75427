//! # Canonical Serialization — JCS-Compatible Byte Production
//!
//! `CanonicalBytes` is the sole construction path for bytes used when
//! signing and verifying follow events (`meshnode-routing::FollowEvent`)
//! and when computing the digests packets are checked against
//! (`ExecutionDigest`). Two nodes serializing the same event or packet
//! content independently must produce identical signing input, so the
//! coercion-then-JCS pipeline lives here once rather than being
//! re-derived at each call site.
//!
//! ## Coercion rules
//!
//! 1. Floats are rejected outright — a Prepare's `amount` and a follow
//!    event's `createdAt` must already be integers or strings before
//!    they reach this type; JCS has no canonical float representation.
//! 2. Object keys are already strings in the JSON value tree; nothing
//!    further to coerce there.
//! 3. After coercion, `serde_jcs` produces RFC 8785 output: sorted keys,
//!    compact separators, no trailing whitespace.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS-compatible canonicalization with
/// this crate's float-rejection rule applied first.
///
/// The inner `Vec<u8>` is private; `CanonicalBytes::new` is the only
/// constructor, so nothing downstream can hand a signature or digest
/// function non-canonical bytes by accident.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value: reject floats, then produce
    /// RFC 8785 bytes.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let bytes = serde_jcs::to_string(&value)?.into_bytes();
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Walk a JSON value tree and fail on the first non-integer float found.
/// Everything else (null, bool, string, integer, array, object) is left
/// untouched — serde's own `Serialize` impls already turned timestamps
/// into ISO8601 strings and tuples into arrays by the time this runs.
fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Number(n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shaped like `FollowEvent::signing_payload` — the case this type
    /// exists for.
    fn follow_event_payload(created_at: i64) -> Value {
        serde_json::json!({
            "author": "ed25519:deadbeef",
            "kind": "follow-list",
            "createdAt": created_at,
            "addresses": ["g.mesh.agent-1", "g.mesh.agent-2"],
            "nextHop": "peer-b",
        })
    }

    #[test]
    fn follow_event_payload_canonicalizes_with_sorted_keys() {
        let cb = CanonicalBytes::new(&follow_event_payload(1_700_000_000)).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"addresses":["g.mesh.agent-1","g.mesh.agent-2"],"author":"ed25519:deadbeef","createdAt":1700000000,"kind":"follow-list","nextHop":"peer-b"}"#
        );
    }

    #[test]
    fn two_nodes_canonicalizing_the_same_event_agree_byte_for_byte() {
        let a = CanonicalBytes::new(&follow_event_payload(42)).unwrap();
        let b = CanonicalBytes::new(&follow_event_payload(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wallet_creation_envelope_amount_as_float_is_rejected() {
        let envelope = serde_json::json!({"op": "funding_request", "amount": 12.5});
        let result = CanonicalBytes::new(&envelope);
        match result.unwrap_err() {
            CanonicalizationError::FloatRejected(f) => assert_eq!(f, 12.5),
            other => panic!("expected FloatRejected, got {other}"),
        }
    }

    #[test]
    fn integer_amount_is_accepted() {
        let envelope = serde_json::json!({"op": "payment", "amount": 500});
        let cb = CanonicalBytes::new(&envelope).expect("integer amounts canonicalize");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"amount":500,"op":"payment"}"#);
    }

    #[test]
    fn nested_route_list_keeps_sorted_keys_at_every_level() {
        let data = serde_json::json!({
            "route": {"nextHop": "peer-b", "prefix": "g.mesh"},
            "priorities": [3, 1, 2]
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"priorities":[3,1,2],"route":{"nextHop":"peer-b","prefix":"g.mesh"}}"#);
    }

    #[test]
    fn null_and_bool_pass_through() {
        let data = serde_json::json!({"settled": true, "pendingReason": null});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"pendingReason":null,"settled":true}"#);
    }

    #[test]
    fn empty_address_list_round_trips() {
        let data = serde_json::json!({"addresses": []});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"addresses":[]}"#);
    }

    #[test]
    fn len_and_is_empty_reflect_the_encoded_form() {
        let cb = CanonicalBytes::new(&serde_json::json!({"nodeId": "n1"})).unwrap();
        assert!(!cb.is_empty());
        assert!(cb.len() > 0);
    }

    #[test]
    fn negative_and_large_settlement_amounts_round_trip() {
        let data = serde_json::json!({"netBalance": -8000, "creditLimit": 9_999_999_999i64});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"creditLimit":9999999999,"netBalance":-8000}"#);
    }

    #[test]
    fn float_nested_under_a_list_entry_is_still_rejected() {
        let data = serde_json::json!({"entries": [{"amount": 3.14}]});
        assert!(CanonicalBytes::new(&data).is_err());
    }

    #[test]
    fn non_ascii_agent_id_round_trips() {
        let data = serde_json::json!({"agentId": "agent-\u{00e9}\u{00e8}"});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert!(s.contains('\u{00e9}'));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Generates JSON shaped like the envelopes this crate actually
    /// canonicalizes (follow-event fields, wallet/payment operation
    /// data) rather than arbitrary JSON: short lowercase keys, ASCII
    /// identifier-like strings, and no floats.
    fn connector_like_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-z][a-z0-9-]{0,20}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-zA-Z]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn never_panics_on_float_free_connector_payloads(value in connector_like_value()) {
            prop_assert!(CanonicalBytes::new(&value).is_ok());
        }

        #[test]
        fn deterministic_across_two_independent_calls(value in connector_like_value()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn output_is_always_valid_utf8_and_reparses_as_json(value in connector_like_value()) {
            let cb = CanonicalBytes::new(&value).unwrap();
            let s = std::str::from_utf8(cb.as_bytes());
            prop_assert!(s.is_ok());
            let reparsed: Result<Value, _> = serde_json::from_str(s.unwrap());
            prop_assert!(reparsed.is_ok());
        }

        #[test]
        fn object_keys_come_out_lexicographically_sorted(
            keys in prop::collection::btree_set("[a-z]{1,8}", 2..6)
        ) {
            let map: serde_json::Map<String, Value> = keys.iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), serde_json::json!(i)))
                .collect();
            let cb = CanonicalBytes::new(&Value::Object(map)).unwrap();
            let parsed: serde_json::Map<String, Value> =
                serde_json::from_slice(cb.as_bytes()).unwrap();
            let output_keys: Vec<&String> = parsed.keys().collect();
            let mut sorted = output_keys.clone();
            sorted.sort();
            prop_assert_eq!(output_keys, sorted);
        }

        #[test]
        fn any_non_integer_float_anywhere_in_the_tree_is_rejected(
            f in any::<f64>().prop_filter("not integer", |f| f.fract() != 0.0 && f.is_finite())
        ) {
            let data = serde_json::json!({"amount": f});
            prop_assert!(CanonicalBytes::new(&data).is_err());
        }
    }
}
