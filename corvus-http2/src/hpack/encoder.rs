//! HPACK encoder (RFC 7541 §6), the mirror of [`super::decoder::Decoder`]:
//! picks the cheapest representation for each header (full index, name-only
//! index, or full literal) honoring the caller's requested
//! [`IndexingPolicy`], and maintains its own copy of the dynamic table so
//! its addressing matches what the peer's decoder will compute.

use bytes::BufMut;

use super::header::{HeaderField, IndexingPolicy};
use super::primitive;
use super::static_table;
use super::table::DynamicTable;

pub struct Encoder {
    table: DynamicTable,
    /// Pending SETTINGS_HEADER_TABLE_SIZE changes not yet flushed as a
    /// dynamic-table-size-update instruction; RFC 7541 §6.3 requires the
    /// update to be emitted before the next header block once the local
    /// SETTINGS change has been ACKed.
    pending_resize: Option<usize>,
}

impl Encoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_size),
            pending_resize: None,
        }
    }

    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.table
    }

    /// Queue a table-size change driven by the peer's
    /// SETTINGS_HEADER_TABLE_SIZE update; emitted as the first instruction
    /// of the next [`encode`](Self::encode) call.
    pub fn queue_resize(&mut self, max_size: usize) {
        self.pending_resize = Some(max_size);
    }

    pub fn encode(&mut self, headers: &[HeaderField], out: &mut impl BufMut) {
        if let Some(size) = self.pending_resize.take() {
            self.table.set_max_size(size);
            primitive::encode_int(size as u64, 5, 0x20, out);
        }

        for header in headers {
            self.encode_one(header, out);
        }
    }

    fn encode_one(&mut self, header: &HeaderField, out: &mut impl BufMut) {
        if let Some(index) = static_table::index_of_pair(&header.name, &header.value)
            .or_else(|| self.table.index_of_pair(&header.name, &header.value))
        {
            primitive::encode_int(index as u64, 7, 0x80, out);
            return;
        }

        let name_index = static_table::index_of_name(&header.name)
            .or_else(|| self.table.index_of_name(&header.name));

        let (first_byte, prefix_bits) = match header.indexing {
            IndexingPolicy::Indexed => (0x40, 6),
            IndexingPolicy::WithoutIndexing => (0x00, 4),
            IndexingPolicy::NeverIndexed => (0x10, 4),
        };

        match name_index {
            Some(index) => primitive::encode_int(index as u64, prefix_bits, first_byte, out),
            None => {
                primitive::encode_int(0, prefix_bits, first_byte, out);
                encode_preferred_string(header.name.as_bytes(), out);
            }
        }
        encode_preferred_string(header.value.as_bytes(), out);

        if header.indexing == IndexingPolicy::Indexed {
            self.table
                .add(std::sync::Arc::clone(&header.name), std::sync::Arc::clone(&header.value));
        }
    }
}

/// Huffman-encode whenever it is not larger than the raw octets; ties go
/// to Huffman since it is never worse on the wire.
fn encode_preferred_string(value: &[u8], out: &mut impl BufMut) {
    let huffman_len = super::huffman::encoded_len(value);
    let use_huffman = huffman_len <= value.len();
    primitive::encode_string(value, use_huffman, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn repeated_pair_becomes_fully_indexed() {
        let mut encoder = Encoder::new(4096);
        let header = HeaderField::new("custom-key", "custom-value");
        let mut first = BytesMut::new();
        encoder.encode(std::slice::from_ref(&header), &mut first);
        let mut second = BytesMut::new();
        encoder.encode(std::slice::from_ref(&header), &mut second);
        // second encoding should be a single indexed-field byte since the
        // first call added it to the dynamic table
        assert_eq!(second.len(), 1);
        assert_eq!(second[0] & 0x80, 0x80);
    }

    #[test]
    fn never_indexed_header_is_not_added_to_table() {
        let mut encoder = Encoder::new(4096);
        let header = HeaderField::never_indexed("cookie", "secret=1");
        let mut out = BytesMut::new();
        encoder.encode(std::slice::from_ref(&header), &mut out);
        assert_eq!(encoder.dynamic_table().len(), 0);
        assert_eq!(out[0] & 0xf0, 0x10);
    }

    #[test]
    fn static_table_pair_match_is_single_byte() {
        let mut encoder = Encoder::new(4096);
        let header = HeaderField::new(":method", "GET");
        let mut out = BytesMut::new();
        encoder.encode(std::slice::from_ref(&header), &mut out);
        assert_eq!(out.as_ref(), &[0x82]);
    }

    #[test]
    fn queued_resize_emits_size_update_first() {
        let mut encoder = Encoder::new(4096);
        encoder.queue_resize(0);
        let header = HeaderField::new("x", "y");
        let mut out = BytesMut::new();
        encoder.encode(std::slice::from_ref(&header), &mut out);
        assert_eq!(out[0], 0x20); // size update to 0, 5-bit prefix
        assert_eq!(encoder.dynamic_table().max_size(), 0);
    }
}
