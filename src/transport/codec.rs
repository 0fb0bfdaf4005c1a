//! Peer Wire Codec
//!
//! Response bodies travel as MessagePack. The request needs no body: group
//! and key are carried in the URL path.

use crate::domain::ports::FetchResponse;
use crate::error::Result;

/// Content type of encoded response bodies
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// Encode a response body
pub fn encode_response(response: &FetchResponse) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(response)?)
}

/// Decode a response body
pub fn decode_response(body: &[u8]) -> Result<FetchResponse> {
    Ok(rmp_serde::from_slice(body)?)
}
