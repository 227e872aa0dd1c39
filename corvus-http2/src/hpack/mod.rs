//! HPACK header compression (RFC 7541): the 61-entry static table, the
//! per-connection dynamic table, the canonical Huffman code, and the
//! [`Encoder`]/[`Decoder`] pair that sit on either side of a connection's
//! header blocks.

mod decoder;
mod encoder;
mod header;
mod huffman;
mod primitive;
mod static_table;
mod table;

pub use decoder::{Decoder, DecoderError};
pub use encoder::Encoder;
pub use header::{HeaderField, IndexingPolicy};
pub use table::DynamicTable;

#[cfg(test)]
mod roundtrip;
