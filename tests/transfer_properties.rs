//! Property tests for the transfer engine
//!
//! Exercises the public transfer API end to end: what an outbound transfer
//! writes, an inbound transfer must reconstruct, however the bytes are split.

use lamco_clipshare::clipboard::{Item, Payload, Representation};
use lamco_clipshare::transfer::{
    InboundDecoder, InboundTransfer, MemoryStream, OutboundTransfer, StreamEvent, TransferEvent,
    TransferLimits,
};
use proptest::prelude::*;

fn type_tag() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8}(\\.[a-z0-9-]{1,12}){0,2}",
        // Empty and multibyte tags
        "\\PC{0,12}",
    ]
}

fn representation() -> impl Strategy<Value = Representation> {
    (type_tag(), proptest::collection::vec(any::<u8>(), 0..96))
        .prop_map(|(tag, data)| Representation::new(tag, data))
}

fn item() -> impl Strategy<Value = Item> {
    proptest::collection::vec(representation(), 1..5)
        .prop_map(|reps| Item::new(reps).expect("1-4 representations"))
}

/// Items near the 255-representation ceiling, with small data
fn wide_item() -> impl Strategy<Value = Item> {
    proptest::collection::vec(
        (type_tag(), proptest::collection::vec(any::<u8>(), 0..4))
            .prop_map(|(tag, data)| Representation::new(tag, data)),
        240..=255,
    )
    .prop_map(|reps| Item::new(reps).expect("at most 255 representations"))
}

fn payload() -> impl Strategy<Value = Payload> {
    proptest::collection::vec(item(), 0..6).prop_map(Payload::new)
}

/// Feed `bytes` in the given chunk sizes and collect everything emitted
fn decode_in_chunks(bytes: &[u8], chunk_sizes: &[usize]) -> (Vec<Item>, usize) {
    let mut decoder = InboundDecoder::new(TransferLimits::default());
    let mut items = Vec::new();
    let mut ended = 0;
    let mut offset = 0;
    let mut sizes = chunk_sizes.iter().cycle();

    while offset < bytes.len() {
        let size = (*sizes.next().unwrap_or(&1)).max(1);
        let end = (offset + size).min(bytes.len());
        decoder.feed(&bytes[offset..end]);
        offset = end;

        for event in decoder.step() {
            match event {
                TransferEvent::ItemComplete(item) => items.push(item),
                TransferEvent::Ended => ended += 1,
            }
        }
    }
    (items, ended)
}

proptest! {
    #[test]
    fn prop_round_trip(payload in payload()) {
        let encoded = payload.encode();
        prop_assert_eq!(encoded.len(), payload.encoded_len());
        prop_assert_eq!(encoded.last().copied(), Some(0x00));

        let (items, ended) = decode_in_chunks(&encoded, &[encoded.len()]);
        prop_assert_eq!(ended, 1);
        prop_assert_eq!(Payload::new(items), payload);
    }

    #[test]
    fn prop_split_equivalence(
        payload in payload(),
        chunk_sizes in proptest::collection::vec(1usize..17, 1..8),
    ) {
        let encoded = payload.encode();
        let (whole, _) = decode_in_chunks(&encoded, &[encoded.len()]);
        let (split, ended) = decode_in_chunks(&encoded, &chunk_sizes);

        prop_assert_eq!(ended, 1);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn prop_truncation_keeps_complete_items(payload in payload(), cut in any::<prop::sample::Index>()) {
        let encoded = payload.encode();
        let cut = cut.index(encoded.len());

        let mut decoder = InboundDecoder::new(TransferLimits::default());
        decoder.feed(&encoded[..cut]);
        let mut events = decoder.step();
        events.extend(decoder.terminate());

        let ended = events.iter().filter(|e| **e == TransferEvent::Ended).count();
        let items: Vec<Item> = events
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::ItemComplete(item) => Some(item),
                TransferEvent::Ended => None,
            })
            .collect();

        // Exactly the items whose bytes fully arrived
        let mut complete = 0;
        let mut consumed = 0;
        for item in payload.items() {
            consumed += item.encoded_len();
            if consumed <= cut {
                complete += 1;
            }
        }

        prop_assert_eq!(ended, 1);
        prop_assert_eq!(items.as_slice(), &payload.items()[..complete]);
    }

    #[test]
    fn prop_outbound_inbound_through_streams(payload in payload(), capacity in 1usize..64) {
        let mut outbound = OutboundTransfer::new(
            1,
            &payload,
            MemoryStream::new().with_write_capacity(capacity),
            &TransferLimits::default(),
        );
        prop_assert!(outbound.start().is_empty());

        let mut rounds = 0;
        while !outbound.is_finished() {
            outbound.handle_event(StreamEvent::HasSpaceAvailable);
            rounds += 1;
            prop_assert!(rounds < 100_000);
        }
        prop_assert_eq!(outbound.bytes_written(), payload.encoded_len());

        let mut incoming = MemoryStream::new();
        incoming.push_incoming(payload.encode());
        let mut inbound = InboundTransfer::new(2, incoming, TransferLimits::default());
        inbound.start();

        let events = inbound.handle_event(StreamEvent::HasBytesAvailable);
        let items: Vec<Item> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::ItemComplete(item) => Some(item.clone()),
                TransferEvent::Ended => None,
            })
            .collect();

        prop_assert_eq!(events.last(), Some(&TransferEvent::Ended));
        prop_assert_eq!(Payload::new(items), payload);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_wide_items_split_equivalence(
        items in proptest::collection::vec(wide_item(), 1..3),
        chunk_sizes in proptest::collection::vec(1usize..33, 1..4),
    ) {
        let payload = Payload::new(items);
        let encoded = payload.encode();
        let (split, ended) = decode_in_chunks(&encoded, &chunk_sizes);

        prop_assert_eq!(ended, 1);
        prop_assert_eq!(Payload::new(split), payload);
    }
}

#[test]
fn test_edge_items_one_byte_at_a_time() {
    let full_item = |prefix: &str| {
        let reps = (0..255)
            .map(|i| match i % 3 {
                0 => Representation::new("", vec![i as u8]),
                1 => Representation::new(format!("{}tÿpé.{}", prefix, i), Vec::new()),
                _ => Representation::new("🦀", vec![0u8; i % 7]),
            })
            .collect();
        Item::new(reps).unwrap()
    };
    let payload = Payload::new(vec![
        full_item("a."),
        Item::single("", Vec::<u8>::new()),
        full_item("b."),
        full_item(""),
    ]);
    let encoded = payload.encode();
    assert_eq!(encoded[0], 255);

    let (items, ended) = decode_in_chunks(&encoded, &[1]);
    assert_eq!(ended, 1);
    assert_eq!(items.len(), 4);
    assert_eq!(items[1].representations()[0].type_tag, "");
    assert!(items[1].representations()[0].data.is_empty());
    assert_eq!(Payload::new(items), payload);
}

#[test]
fn test_plain_text_scenario() {
    let payload = Payload::new(vec![Item::single("public.utf8-plain-text", "hi")]);

    let mut expected = vec![0x01];
    expected.extend_from_slice(&22u64.to_be_bytes());
    expected.extend_from_slice(b"public.utf8-plain-text");
    expected.extend_from_slice(&2u64.to_be_bytes());
    expected.extend_from_slice(b"hi");
    expected.push(0x00);

    assert_eq!(&payload.encode()[..], &expected[..]);

    let (items, ended) = decode_in_chunks(&expected, &[1]);
    assert_eq!(ended, 1);
    assert_eq!(items.len(), 1);
    assert_eq!(
        &items[0].representation("public.utf8-plain-text").unwrap().data[..],
        b"hi"
    );
}
