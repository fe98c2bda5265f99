//! Eigenschafts-Tests fuer Frame-Verschluesselung und KeyRing

use std::collections::HashSet;

use proptest::prelude::*;

use callveil_crypto::e2e::{parse_wire, KEY_RING_CAPACITY};
use callveil_crypto::{
    EncodedFrame, FailurePolicy, FrameCipher, FrameOutcome, KeyMaterial, KeyRing, MediaKind,
    SenderKeySlot, SessionKey,
};

fn frame_strategy() -> impl Strategy<Value = EncodedFrame> {
    (
        any::<bool>(),
        any::<u64>(),
        any::<bool>(),
        prop::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(|(video, timestamp, key_frame, data)| {
            if video {
                EncodedFrame::video(timestamp, key_frame, data)
            } else {
                EncodedFrame::audio(timestamp, data)
            }
        })
}

proptest! {
    #[test]
    fn verschluesselung_ist_umkehrbar(
        key in any::<[u8; 32]>(),
        key_id in any::<u32>(),
        frames in prop::collection::vec(frame_strategy(), 1..16),
    ) {
        let mut sender = FrameCipher::sender(SenderKeySlot::new(), FailurePolicy::Drop);
        let mut receiver = FrameCipher::receiver(KeyRing::new(), FailurePolicy::Drop);
        sender.set_session_key(KeyMaterial::new(key), key_id);
        receiver.set_session_key(KeyMaterial::new(key), key_id);

        for frame in frames {
            let eingabe = frame.clone();
            let FrameOutcome::Transformed(verschluesselt) = sender.process(frame) else {
                return Err(TestCaseError::fail("Verschluesselung fehlgeschlagen"));
            };
            let FrameOutcome::Transformed(klartext) = receiver.process(verschluesselt) else {
                return Err(TestCaseError::fail("Entschluesselung fehlgeschlagen"));
            };
            prop_assert_eq!(klartext.data, eingabe.data);
            prop_assert_eq!(klartext.kind, eingabe.kind);
        }
    }

    #[test]
    fn nonces_wiederholen_sich_nicht(
        timestamps in prop::collection::vec(any::<u64>(), 1..64),
    ) {
        let mut sender = FrameCipher::sender(SenderKeySlot::new(), FailurePolicy::Drop);
        sender.set_session_key(KeyMaterial::new([7; 32]), 0);

        let mut gesehen = HashSet::new();
        for ts in timestamps {
            let frame = sender
                .process(EncodedFrame::audio(ts, vec![0]))
                .into_frame()
                .ok_or_else(|| TestCaseError::fail("Frame verworfen"))?;
            let wire = parse_wire(&frame.data)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(wire.metadata.kind, MediaKind::Audio);
            prop_assert!(gesehen.insert(wire.metadata.nonce()));
        }
    }

    #[test]
    fn ring_behaelt_die_groessten_key_ids(ids in prop::collection::vec(any::<u32>(), 0..32)) {
        let ring = KeyRing::new();
        for id in &ids {
            ring.insert(SessionKey::new(KeyMaterial::new([1; 32]), *id));
        }

        let mut erwartet: Vec<u32> = ids.iter().copied().collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let start = erwartet.len().saturating_sub(KEY_RING_CAPACITY);
        erwartet.drain(..start);

        prop_assert!(ring.len() <= KEY_RING_CAPACITY);
        prop_assert_eq!(ring.key_ids(), erwartet);
    }

    #[test]
    fn manipulierte_frames_werden_erkannt(
        data in prop::collection::vec(any::<u8>(), 1..128),
        pos in any::<prop::sample::Index>(),
    ) {
        let mut sender = FrameCipher::sender(SenderKeySlot::new(), FailurePolicy::Drop);
        let mut receiver = FrameCipher::receiver(KeyRing::new(), FailurePolicy::Drop);
        sender.set_session_key(KeyMaterial::new([3; 32]), 0);
        receiver.set_session_key(KeyMaterial::new([3; 32]), 0);

        let mut frame = sender
            .process(EncodedFrame::audio(0, data))
            .into_frame()
            .ok_or_else(|| TestCaseError::fail("Frame verworfen"))?;
        let i = pos.index(frame.data.len());
        frame.data[i] ^= 0x01;

        prop_assert_eq!(receiver.process(frame), FrameOutcome::Dropped);
    }
}
