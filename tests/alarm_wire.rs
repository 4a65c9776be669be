//! Wire-format and relay integration tests: frame shape under arbitrary
//! field content, handler's-eye field offsets, and concurrent emission
//! through one shared relay.

use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use fleet_sentry::alarm::wire::{self, DecodeError, FRAME_LEN, HEADER};
use fleet_sentry::alarm::{AlarmEvent, AlarmRelay, EmitStatus, EventOrigin, RelayConfig};
use fleet_sentry::logger::MemorySink;

fn arb_field(max_chars: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_chars)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// However oversized or strange the raw fields, construction clamps them
    /// and encoding yields exactly one header-tagged 140-byte frame.
    #[test]
    fn prop_every_frame_is_exactly_140_tagged_bytes(
        process in arb_field(16),
        source in arb_field(10),
        code in arb_field(10),
        payload in arb_field(48),
        node in arb_field(10),
    ) {
        let event = AlarmEvent::new(process, source, code, payload, node);
        let frame = wire::encode(&event);
        prop_assert_eq!(frame.len(), FRAME_LEN);
        prop_assert_eq!(&frame[..4], &HEADER);
        prop_assert!(wire::decode(&frame).is_ok());
    }

    /// Decoding an encoded event returns the event as constructed: the
    /// construction-time clamp is the wire's canonical form.
    #[test]
    fn prop_round_trip_returns_the_constructed_event(
        process in arb_field(16),
        source in arb_field(10),
        code in arb_field(10),
        payload in arb_field(48),
        node in arb_field(10),
    ) {
        let event = AlarmEvent::new(process, source, code, payload, node);
        let back = wire::decode(&wire::encode(&event)).unwrap();
        prop_assert_eq!(back, event);
    }

    /// Clamping strips NULs, keeps a char-boundary prefix, and never drops
    /// content that already fits.
    #[test]
    fn prop_payload_clamp_keeps_the_longest_fitting_prefix(raw in arb_field(60)) {
        let event = AlarmEvent::new("acqd", "portmon", "MonPortFail", raw.clone(), "lab-1");
        let stripped: String = raw.chars().filter(|&ch| ch != '\0').collect();

        prop_assert!(event.payload().len() <= 80);
        prop_assert!(stripped.starts_with(event.payload()));
        if stripped.len() <= 80 {
            prop_assert_eq!(event.payload(), stripped);
        } else {
            // Longest fitting prefix: one more char would overflow the slot.
            let next = stripped[event.payload().len()..]
                .chars()
                .next()
                .map_or(0, char::len_utf8);
            prop_assert!(event.payload().len() + next > 80);
        }
    }
}

#[test]
fn handler_sees_fields_at_fixed_offsets() {
    let origin = EventOrigin::new("lab-1", "acqd");
    let frame = wire::encode(&origin.event("pingmon", "PingStale", "gw.lab stale for 1205s"));

    assert_eq!(&frame[..4], &HEADER);
    assert_eq!(&frame[4..8], b"acqd");
    assert!(frame[8..24].iter().all(|&byte| byte == 0));
    assert_eq!(&frame[24..31], b"pingmon");
    assert_eq!(&frame[36..45], b"PingStale");
    assert_eq!(&frame[48..70], b"gw.lab stale for 1205s");
    assert_eq!(&frame[128..133], b"lab-1");
    assert!(frame[133..].iter().all(|&byte| byte == 0));
}

#[test]
fn decode_errors_name_the_defect() {
    let frame = wire::encode(&AlarmEvent::new("acqd", "portmon", "MonPortFail", "x", "lab-1"));

    assert_eq!(
        wire::decode(&frame[..10]),
        Err(DecodeError::Length { actual: 10 })
    );

    let mut corrupt = frame;
    corrupt[0] = 0x7F;
    assert_eq!(
        wire::decode(&corrupt),
        Err(DecodeError::Header {
            found: [0x7F, 0x03, 0x00, 0xC9]
        })
    );
}

#[test]
fn concurrent_emits_all_arrive_as_intact_frames() {
    let receiver = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    let config = RelayConfig {
        handler_host: Some("127.0.0.1".to_string()),
        handler_port: receiver.local_addr().unwrap().port(),
        local_bind_port: 0,
    };
    let relay = Arc::new(AlarmRelay::new(config, Arc::new(MemorySink::new())));
    let origin = Arc::new(EventOrigin::new("lab-1", "acqd"));

    let mut workers = Vec::new();
    for worker in 0..8u32 {
        let relay = relay.clone();
        let origin = origin.clone();
        workers.push(thread::spawn(move || {
            for cycle in 0..25u32 {
                let event = origin.event(
                    "portmon",
                    "MonPortFail",
                    format!("worker {worker} cycle {cycle}"),
                );
                assert_eq!(relay.emit(&event), EmitStatus::Sent);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(relay.stats().sent, 200);

    receiver
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let mut frames = 0usize;
    let mut buf = [0u8; 512];
    while let Ok((len, _)) = receiver.recv_from(&mut buf) {
        assert_eq!(len, FRAME_LEN);
        let event = wire::decode(&buf[..len]).unwrap();
        assert_eq!(event.node(), "lab-1");
        assert_eq!(event.code(), "MonPortFail");
        frames += 1;
    }
    assert_eq!(frames, 200);
}
