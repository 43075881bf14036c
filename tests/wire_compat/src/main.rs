fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use sendit_protocol::{
        ControlFrame, CreateRoomResponse, Frame, InboundFrame, SignalingMessage, TransferMetadata,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key order is irrelevant).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  browser: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    // --- Signaling ---

    #[test]
    fn fixture_offer() {
        let msg = roundtrip_test::<SignalingMessage>("offer.json");
        match msg {
            SignalingMessage::Offer { sdp, peer_id } => {
                assert!(sdp.starts_with("v=0\r\n"));
                assert_eq!(peer_id.as_deref(), Some("k3j9x2m1p8"));
            }
            other => panic!("expected offer, got {other:?}"),
        }
    }

    #[test]
    fn fixture_offer_without_peer_id() {
        let msg = roundtrip_test::<SignalingMessage>("offer_legacy.json");
        assert!(matches!(msg, SignalingMessage::Offer { peer_id: None, .. }));
    }

    #[test]
    fn fixture_answer() {
        let msg = roundtrip_test::<SignalingMessage>("answer.json");
        assert_eq!(msg.kind(), "answer");
    }

    #[test]
    fn fixture_ice_candidate() {
        let msg = roundtrip_test::<SignalingMessage>("ice_candidate.json");
        let SignalingMessage::IceCandidate { candidate } = msg else {
            panic!("expected ice_candidate");
        };
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("a1B2"));
    }

    #[test]
    fn signaling_fixtures_pass_relay_validation() {
        for name in ["offer.json", "offer_legacy.json", "answer.json", "ice_candidate.json"] {
            let text = read_fixture(name);
            SignalingMessage::from_json(&text)
                .unwrap_or_else(|e| panic!("relay would drop {name}: {e}"));
        }
    }

    #[test]
    fn fixture_create_room_response() {
        let resp = roundtrip_test::<CreateRoomResponse>("create_room.json");
        assert_eq!(resp.room_id, "0b6c1f8e-3d4a-4f7b-9a2e-5c8d1e0f6a3b");
    }

    // --- Channel frames ---

    #[test]
    fn fixture_file_start() {
        let frame = roundtrip_test::<ControlFrame>("file_start.json");
        let meta = TransferMetadata::from_control(&frame).unwrap();
        assert_eq!(meta.name, "holiday photo.jpg");
        assert_eq!(meta.size, 50_000);
        assert_eq!(meta.mime_type, "image/jpeg");
        assert_eq!(meta.total_chunks, 4);
    }

    #[test]
    fn fixture_file_end() {
        let frame = roundtrip_test::<ControlFrame>("file_end.json");
        assert_eq!(frame, ControlFrame::FileEnd);
    }

    #[test]
    fn outgoing_file_start_matches_fixture() {
        let meta = TransferMetadata::new("holiday photo.jpg", 50_000, "image/jpeg", 16_384).unwrap();
        let text = ControlFrame::start(&meta).to_text().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sent, load_fixture("file_start.json"));
    }

    #[test]
    fn text_fixtures_classify_as_control() {
        for name in ["file_start.json", "file_end.json"] {
            let frame = InboundFrame::classify(Frame::Text(read_fixture(name))).unwrap();
            assert!(
                matches!(frame, InboundFrame::Control(_)),
                "{name} classified as {frame:?}"
            );
        }
    }
}
