fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    use blockput_protocol::{
        ChunkReply, MakeFile, make_block_url, make_file_body, make_file_url, put_chunk_url,
    };
    use blockput_transfer::{Checkpoint, Layout, checksum_bytes};
    use serde::Deserialize;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
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
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Checkpoint ---

    #[test]
    fn fixture_checkpoint() {
        let cp: Checkpoint = roundtrip_test("checkpoint.json");
        assert_eq!(cp.offset, 5 * 1024 * 1024);
        assert_eq!(
            cp.context_slots(),
            vec![Some("ctx-block-0".into()), Some("ctx-block-1".into()), None]
        );

        let layout = Layout::new(cp.size, 4 * 1024 * 1024, 1024 * 1024).unwrap();
        assert!(cp.validate(&layout, 1_700_000_000_000).is_ok());
    }

    #[test]
    fn checkpoint_bytes_decode() {
        let data = fs::read(fixtures_dir().join("checkpoint.json")).unwrap();
        let cp = Checkpoint::decode(&data).unwrap();
        let reencoded = Checkpoint::decode(&cp.encode().unwrap()).unwrap();
        assert_eq!(cp, reencoded);
    }

    // --- Chunk replies ---

    #[test]
    fn fixture_chunk_reply() {
        let reply: ChunkReply = roundtrip_test("chunk_reply.json");
        assert_eq!(reply.crc32, 3_609_952_386);
        assert_eq!(reply.expired_at, 1_700_604_800);
    }

    #[test]
    fn fixture_chunk_reply_minimal() {
        let reply: ChunkReply = roundtrip_test("chunk_reply_minimal.json");
        assert_eq!(reply.ctx, "ctx0");
        assert!(reply.host.is_empty());
    }

    #[test]
    fn chunk_reply_from_body_rejects_partial_replies() {
        let fixture = load_fixture("chunk_reply.json");
        assert!(ChunkReply::from_body(&fixture).is_some());

        let mut no_crc = fixture.clone();
        no_crc.as_object_mut().unwrap().remove("crc32");
        assert!(ChunkReply::from_body(&no_crc).is_none());

        let mut empty_ctx = fixture;
        empty_ctx["ctx"] = serde_json::json!("");
        assert!(ChunkReply::from_body(&empty_ctx).is_none());
    }

    #[test]
    fn crc32_matches_ieee_check_value() {
        assert_eq!(checksum_bytes(b"123456789"), 0xCBF4_3926);
    }

    // --- URLs and bodies ---

    #[derive(Deserialize)]
    struct BlockCase {
        host: String,
        block_size: u64,
        url: String,
    }

    #[derive(Deserialize)]
    struct ChunkCase {
        host: String,
        context: String,
        chunk_offset: u64,
        url: String,
    }

    #[derive(Deserialize)]
    struct FileCase {
        host: String,
        size: u64,
        mime_type: String,
        key: Option<String>,
        params: BTreeMap<String, String>,
        url: String,
    }

    #[derive(Deserialize)]
    struct BodyCase {
        contexts: Vec<String>,
        body: String,
    }

    #[derive(Deserialize)]
    struct UrlFixtures {
        make_block: Vec<BlockCase>,
        put_chunk: Vec<ChunkCase>,
        make_file: Vec<FileCase>,
        make_file_body: Vec<BodyCase>,
    }

    fn url_fixtures() -> UrlFixtures {
        serde_json::from_value(load_fixture("urls.json")).unwrap()
    }

    #[test]
    fn fixture_block_and_chunk_urls() {
        let fixtures = url_fixtures();
        for case in &fixtures.make_block {
            assert_eq!(make_block_url(&case.host, case.block_size), case.url);
        }
        for case in &fixtures.put_chunk {
            assert_eq!(
                put_chunk_url(&case.host, &case.context, case.chunk_offset),
                case.url
            );
        }
    }

    #[test]
    fn fixture_make_file_urls() {
        for case in url_fixtures().make_file {
            let req = MakeFile {
                size: case.size,
                mime_type: &case.mime_type,
                key: case.key.as_deref(),
                params: &case.params,
            };
            assert_eq!(make_file_url(&case.host, &req), case.url);
        }
    }

    #[test]
    fn fixture_make_file_bodies() {
        for case in url_fixtures().make_file_body {
            assert_eq!(
                String::from_utf8(make_file_body(&case.contexts)).unwrap(),
                case.body
            );
        }
    }
}
