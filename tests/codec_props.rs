//! Property tests for the frame and envelope codecs

use std::time::Duration;

use proptest::prelude::*;

use voltage_fins::envelope::{encode_request, FinsEnvelope};
use voltage_fins::frame::{encode_frame, read_frame, FrameHeader};
use voltage_fins::utils::Deadline;
use voltage_fins::{FinsRequest, NodeIds, ServiceIdCounter, TcpCommand, TcpErrorCode};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn node_ids() -> impl Strategy<Value = NodeIds> {
    (1u8..=254, 1u8..=254)
        .prop_filter("ids must differ", |(l, r)| l != r)
        .prop_map(|(l, r)| NodeIds::new(l, r).unwrap())
}

/// Response-shaped payloads: marker, rest of header, codes, data
fn fins_payload() -> impl Strategy<Value = Vec<u8>> {
    (
        prop_oneof![Just(0xC0u8), Just(0xC1u8)],
        prop::collection::vec(any::<u8>(), 12..600),
    )
        .prop_map(|(marker, rest)| {
            let mut payload = vec![marker];
            payload.extend(rest);
            payload
        })
}

proptest! {
    #[test]
    fn prop_frame_length_field_is_payload_plus_eight(
        payload in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let frame = encode_frame(TcpCommand::FinsFrame, &payload);
        let header = FrameHeader::parse(&frame).unwrap();
        prop_assert_eq!(header.length as usize, payload.len() + 8);
        prop_assert_eq!(frame.len(), 16 + payload.len());
        prop_assert_eq!(&frame[16..], &payload[..]);
    }

    #[test]
    fn prop_frame_decodes_what_was_encoded(
        payload in fins_payload(),
        split in 1usize..16,
    ) {
        let frame = encode_frame(TcpCommand::FinsFrame, &payload);
        let split = split.min(frame.len() - 1);
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame[..split])
            .read(&frame[split..])
            .build();

        let received = runtime().block_on(async {
            let deadline = Deadline::after(Duration::from_secs(1));
            read_frame(&mut reader, TcpCommand::FinsFrame, &deadline, Duration::from_millis(50)).await
        }).unwrap();

        prop_assert_eq!(&received.payload[..], &payload[..]);
        prop_assert_eq!(received.bytes, frame.len());
    }

    #[test]
    fn prop_envelope_carries_body_and_addressing(
        nodes in node_ids(),
        sid in any::<u8>(),
        fc in any::<u8>(),
        sfc in any::<u8>(),
        body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let request = FinsRequest::new(fc, sfc, body.clone());
        let envelope = FinsEnvelope::decode(&encode_request(&request, nodes, sid)).unwrap();

        prop_assert_eq!(envelope.header.da1, nodes.remote());
        prop_assert_eq!(envelope.header.sa1, nodes.local());
        prop_assert_eq!(envelope.header.sid, sid);
        prop_assert_eq!((envelope.function_code, envelope.sub_function_code), (fc, sfc));
        prop_assert_eq!(&envelope.body[..], &body[..]);
    }

    #[test]
    fn prop_service_id_wraps_modulo_256(start in any::<u8>(), steps in 1usize..1024) {
        let mut ids = ServiceIdCounter::starting_at(start);
        let mut last = start;
        for _ in 0..steps {
            last = ids.next_id();
        }
        prop_assert_eq!(last as usize, (start as usize + steps) % 256);
    }

    #[test]
    fn prop_tcp_error_code_keeps_raw_value(code in any::<u8>()) {
        prop_assert_eq!(TcpErrorCode::from_u8(code).to_u8(), code);
    }
}
