//! Request URLs, bodies and the chunk reply shape.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};

/// URL-safe base64 with padding, as the server expects in `mkfile` paths.
pub fn url_safe_base64(value: &str) -> String {
    URL_SAFE.encode(value.as_bytes())
}

/// Value of the `Authorization` header for an upload token.
pub fn up_token(token: &str) -> String {
    format!("UpToken {token}")
}

/// Creates a block and uploads its first chunk.
pub fn make_block_url(host: &str, block_size: u64) -> String {
    format!("http://{host}/mkblk/{block_size}")
}

/// Appends a chunk to the block identified by `context`.
pub fn put_chunk_url(host: &str, context: &str, chunk_offset: u64) -> String {
    format!("http://{host}/bput/{context}/{chunk_offset}")
}

/// Parameters of the final `mkfile` call.
#[derive(Debug, Clone)]
pub struct MakeFile<'a> {
    pub size: u64,
    pub mime_type: &'a str,
    pub key: Option<&'a str>,
    pub params: &'a BTreeMap<String, String>,
}

/// Stitches all blocks into one object.
///
/// `http://{host}/mkfile/{size}/mimeType/{b64}[/key/{b64}][/{name}/{b64}]*`
pub fn make_file_url(host: &str, req: &MakeFile<'_>) -> String {
    let mut url = format!(
        "http://{host}/mkfile/{}/mimeType/{}",
        req.size,
        url_safe_base64(req.mime_type)
    );
    if let Some(key) = req.key {
        url.push_str("/key/");
        url.push_str(&url_safe_base64(key));
    }
    for (name, value) in req.params {
        url.push('/');
        url.push_str(name);
        url.push('/');
        url.push_str(&url_safe_base64(value));
    }
    url
}

/// Comma-joined block contexts in block order.
pub fn make_file_body<S: AsRef<str>>(contexts: &[S]) -> Vec<u8> {
    contexts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
        .into_bytes()
}

/// Body of a successful `mkblk` / `bput` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReply {
    pub ctx: String,
    pub crc32: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub expired_at: i64,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl ChunkReply {
    /// Parses a reply body. `None` when `ctx` or `crc32` is missing or mistyped.
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        let reply = Self::deserialize(body).ok()?;
        if reply.ctx.is_empty() {
            return None;
        }
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_chunk_urls() {
        assert_eq!(
            make_block_url("upload.example.com", 4194304),
            "http://upload.example.com/mkblk/4194304"
        );
        assert_eq!(
            put_chunk_url("upload.example.com", "ctx-abc", 262144),
            "http://upload.example.com/bput/ctx-abc/262144"
        );
    }

    #[test]
    fn make_file_url_minimal() {
        let params = BTreeMap::new();
        let url = make_file_url(
            "h",
            &MakeFile {
                size: 10,
                mime_type: "application/octet-stream",
                key: None,
                params: &params,
            },
        );
        assert_eq!(url, "http://h/mkfile/10/mimeType/YXBwbGljYXRpb24vb2N0ZXQtc3RyZWFt");
    }

    #[test]
    fn make_file_url_with_key_and_params() {
        let mut params = BTreeMap::new();
        params.insert("x:foo".to_string(), "bar".to_string());
        params.insert("x:a".to_string(), "b?".to_string());
        let url = make_file_url(
            "h",
            &MakeFile {
                size: 1,
                mime_type: "text/plain",
                key: Some("dir/file.txt"),
                params: &params,
            },
        );
        assert_eq!(
            url,
            "http://h/mkfile/1/mimeType/dGV4dC9wbGFpbg==/key/ZGlyL2ZpbGUudHh0/x:a/Yj8=/x:foo/YmFy"
        );
    }

    #[test]
    fn url_safe_alphabet() {
        assert_eq!(url_safe_base64("\u{fb}"), "w7s=");
        assert_eq!(url_safe_base64("???"), "Pz8_");
        assert_eq!(url_safe_base64("??>>"), "Pz8-Pg==");
    }

    #[test]
    fn body_joins_contexts() {
        assert_eq!(make_file_body(&["a", "b", "c"]), b"a,b,c".to_vec());
        assert_eq!(make_file_body::<&str>(&[]), Vec::<u8>::new());
    }

    #[test]
    fn auth_header_value() {
        assert_eq!(up_token("tok:sig"), "UpToken tok:sig");
    }

    #[test]
    fn chunk_reply_parsing() {
        let body = serde_json::json!({
            "ctx": "c1",
            "checksum": "x",
            "crc32": 3964322768u64,
            "offset": 262144,
            "host": "http://up.example.com",
            "expired_at": 1700000000
        });
        let reply = ChunkReply::from_body(&body).unwrap();
        assert_eq!(reply.ctx, "c1");
        assert_eq!(reply.crc32, 3964322768);
        assert_eq!(reply.offset, 262144);

        assert!(ChunkReply::from_body(&serde_json::json!({"crc32": 1})).is_none());
        assert!(ChunkReply::from_body(&serde_json::json!({"ctx": "c"})).is_none());
        assert!(ChunkReply::from_body(&serde_json::json!({"ctx": "", "crc32": 1})).is_none());
        assert!(ChunkReply::from_body(&serde_json::json!({"ctx": "c", "crc32": "1"})).is_none());
        assert!(ChunkReply::from_body(&serde_json::json!([1, 2])).is_none());
    }
}
