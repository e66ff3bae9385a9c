//! Property tests for the shared row and payload definitions.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in realtime payload decoding.
//! 2. Any message row survives insert-payload encode → decode.
//! 3. Participant pairs are canonical regardless of argument order.
//! 4. The address shape check agrees with its documented grammar.

use ledgerchat_proto::address::{self, BASE58_ALPHABET};
use ledgerchat_proto::message::{MessageId, MessageRow, PublicId, ThreadId, Timestamp};
use ledgerchat_proto::realtime::{self, ChangeEvent};
use ledgerchat_proto::thread::ParticipantPair;
use proptest::prelude::*;
use uuid::Uuid;

fn arb_public_id() -> impl Strategy<Value = PublicId> {
    "r[1-9A-HJ-NP-Za-km-z]{25,34}".prop_map(PublicId::new)
}

/// Timestamps between 2001 and 2100, millisecond precision.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (1_000_000_000_000i64..4_102_444_800_000).prop_map(Timestamp::from_millis)
}

fn arb_row() -> impl Strategy<Value = MessageRow> {
    (
        any::<u128>(),
        any::<u128>(),
        arb_public_id(),
        ".{0,256}",
        arb_timestamp(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(id, thread, sender_id, content, created_at, is_encrypted, read)| MessageRow {
                id: MessageId::from_uuid(Uuid::from_u128(id)),
                thread_id: ThreadId::from_uuid(Uuid::from_u128(thread)),
                sender_id,
                content,
                created_at,
                is_encrypted,
                read,
            },
        )
}

proptest! {
    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = realtime::decode(&bytes);
        let _ = realtime::decode_message_insert(&bytes);
    }

    #[test]
    fn insert_payload_preserves_row(row in arb_row()) {
        let event = ChangeEvent::message_insert(&row).unwrap();
        let bytes = realtime::encode(&event).unwrap();
        prop_assert_eq!(realtime::decode_message_insert(&bytes).unwrap(), row);
    }

    #[test]
    fn participant_pair_is_order_independent(a in arb_public_id(), b in arb_public_id()) {
        let ab = ParticipantPair::new(a.clone(), b.clone());
        let ba = ParticipantPair::new(b, a);
        prop_assert!(ab.first() <= ab.second());
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn generated_addresses_are_valid(id in arb_public_id()) {
        prop_assert!(address::is_valid_address_format(id.as_str()));
    }

    #[test]
    fn address_check_matches_grammar(s in ".{0,40}") {
        let expected = s.len() >= 26
            && s.len() <= 35
            && s.starts_with('r')
            && s.bytes().skip(1).all(|c| BASE58_ALPHABET.contains(&c));
        prop_assert_eq!(address::is_valid_address_format(&s), expected);
    }
}
