//! Wire protocol for the block/chunk resumable upload API.
//!
//! Everything here must match the server bit-for-bit: URL layouts,
//! the `UpToken` authorization header, the chunk reply body and the
//! status codes used to classify failures.

pub mod constants;
pub mod response;
pub mod wire;

pub use response::{ResponseInfo, status};
pub use wire::{
    ChunkReply, MakeFile, make_block_url, make_file_body, make_file_url, put_chunk_url,
    up_token, url_safe_base64,
};
