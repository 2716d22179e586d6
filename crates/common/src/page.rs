//! Page batches returned by a task output buffer.
//!
//! A page is opaque to everything above the worker: the coordinator side only
//! routes it. Batches travel as protobuf messages.

use crate::error::Result;
use prost::bytes::{Buf, Bytes};
use prost::Message;

/// Header carrying the token to request next from the buffer.
pub const HEADER_PAGE_NEXT_TOKEN: &str = "x-igloo-page-next-token";
/// Header set to `true` once the buffer will produce no more pages.
pub const HEADER_BUFFER_COMPLETE: &str = "x-igloo-buffer-complete";
pub const PAGES_CONTENT_TYPE: &str = "application/x-igloo-pages";

/// An opaque batch of rows conforming to the stream's schema.
#[derive(Clone, PartialEq, Message)]
pub struct Page {
    #[prost(uint32, tag = "1")]
    pub position_count: u32,
    #[prost(bytes = "bytes", tag = "2")]
    pub data: Bytes,
}

impl Page {
    pub fn new(position_count: u32, data: impl Into<Bytes>) -> Self {
        Self { position_count, data: data.into() }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PageBatch {
    #[prost(message, repeated, tag = "1")]
    pub pages: Vec<Page>,
}

pub fn encode_pages(pages: Vec<Page>) -> Vec<u8> {
    PageBatch { pages }.encode_to_vec()
}

pub fn decode_pages(body: impl Buf) -> Result<Vec<Page>> {
    Ok(PageBatch::decode(body)?.pages)
}
