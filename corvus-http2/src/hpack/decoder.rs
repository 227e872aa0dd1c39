//! HPACK decoder (RFC 7541 §6): classifies each instruction byte by its
//! high bits and emits one [`HeaderField`] per instruction into the
//! caller's notifier as it goes, so a header block can be decoded
//! incrementally as `CONTINUATION` frames arrive without buffering the
//! whole thing first.

use std::sync::Arc;

use bytes::Buf;

use super::header::{HeaderField, IndexingPolicy};
use super::primitive::{self, PrimitiveError};
use super::table::DynamicTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    /// A literal or indexed-field index fell outside the static+dynamic
    /// addressing space.
    InvalidIndex,
    /// A size-update instruction appeared after a header instruction in
    /// the same block (RFC 7541 §6.3: must come first).
    SizeUpdateAfterHeader,
    /// A size-update exceeded the connection's agreed maximum.
    SizeUpdateTooLarge,
    /// A truncated integer, string, or instruction stream.
    Truncated,
    /// A Huffman-coded string was malformed.
    Huffman,
}

impl From<PrimitiveError> for DecoderError {
    fn from(err: PrimitiveError) -> Self {
        match err {
            PrimitiveError::TruncatedInteger | PrimitiveError::TruncatedString => {
                Self::Truncated
            }
            PrimitiveError::IntegerOverflow => Self::Truncated,
            PrimitiveError::Huffman => Self::Huffman,
        }
    }
}

/// Per-connection HPACK decoder. Owns the dynamic table; its
/// `header_table_size` is tied to the local `SETTINGS_HEADER_TABLE_SIZE`
/// this side has advertised to the peer.
pub struct Decoder {
    table: DynamicTable,
    max_allowed_size: usize,
}

impl Decoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_size),
            max_allowed_size: max_size,
        }
    }

    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.table
    }

    /// Update the maximum the peer is allowed to shrink/grow the dynamic
    /// table to, in response to a local SETTINGS_HEADER_TABLE_SIZE change.
    pub fn set_max_allowed_size(&mut self, max_size: usize) {
        self.max_allowed_size = max_size;
        if self.table.max_size() > max_size {
            self.table.set_max_size(max_size);
        }
    }

    /// Decode one full header block, appending each field to `out` in
    /// wire order. A `CONTINUATION`-spanning block should be concatenated
    /// by the caller before calling this (the frame layer already buffers
    /// header fragments until `END_HEADERS`).
    pub fn decode(&mut self, mut buf: &[u8], out: &mut Vec<HeaderField>) -> Result<(), DecoderError> {
        let mut seen_header = false;
        while buf.has_remaining() {
            let first = buf.chunk()[0];
            if first & 0x80 != 0 {
                seen_header = true;
                self.decode_indexed(&mut buf, out)?;
            } else if first & 0x40 != 0 {
                seen_header = true;
                self.decode_literal(&mut buf, out, IndexingPolicy::Indexed, 6)?;
            } else if first & 0x20 != 0 {
                if seen_header {
                    return Err(DecoderError::SizeUpdateAfterHeader);
                }
                self.decode_size_update(&mut buf)?;
            } else if first & 0x10 != 0 {
                seen_header = true;
                self.decode_literal(&mut buf, out, IndexingPolicy::NeverIndexed, 4)?;
            } else {
                seen_header = true;
                self.decode_literal(&mut buf, out, IndexingPolicy::WithoutIndexing, 4)?;
            }
        }
        Ok(())
    }

    fn decode_indexed(&self, buf: &mut &[u8], out: &mut Vec<HeaderField>) -> Result<(), DecoderError> {
        let first = buf.get_u8();
        let index = primitive::decode_int(first, 7, buf)? as usize;
        let (name, value) = self.table.resolve(index).ok_or(DecoderError::InvalidIndex)?;
        out.push(HeaderField {
            name,
            value,
            indexing: IndexingPolicy::Indexed,
        });
        Ok(())
    }

    fn decode_literal(
        &mut self,
        buf: &mut &[u8],
        out: &mut Vec<HeaderField>,
        indexing: IndexingPolicy,
        prefix_bits: u8,
    ) -> Result<(), DecoderError> {
        let first = buf.get_u8();
        let index = primitive::decode_int(first, prefix_bits, buf)? as usize;
        let name: Arc<str> = if index == 0 {
            Arc::from(String::from_utf8_lossy(&primitive::decode_string(buf)?).into_owned())
        } else {
            self.table
                .resolve(index)
                .ok_or(DecoderError::InvalidIndex)?
                .0
        };
        let value: Arc<str> =
            Arc::from(String::from_utf8_lossy(&primitive::decode_string(buf)?).into_owned());

        if indexing == IndexingPolicy::Indexed {
            self.table.add(Arc::clone(&name), Arc::clone(&value));
        }
        out.push(HeaderField {
            name,
            value,
            indexing,
        });
        Ok(())
    }

    fn decode_size_update(&mut self, buf: &mut &[u8]) -> Result<(), DecoderError> {
        let first = buf.get_u8();
        let size = primitive::decode_int(first, 5, buf)? as usize;
        if size > self.max_allowed_size {
            return Err(DecoderError::SizeUpdateTooLarge);
        }
        self.table.set_max_size(size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap_or(0))
            .collect()
    }

    #[test]
    fn rfc7541_c_3_3_without_huffman() {
        // First seed the dynamic table as C.3.1/C.3.2 would have left it:
        // a single entry custom-key: custom-value from a prior block.
        let mut decoder = Decoder::new(4096);
        decoder
            .table
            .add(Arc::from("custom-key"), Arc::from("custom-value"));

        let wire = hex("828786bf400a637573746f6d2d6b65790c637573746f6d2d76616c7565");
        let mut fields = Vec::new();
        if decoder.decode(&wire, &mut fields).is_err() {
            panic!("C.3.3 test vector failed to decode");
        }

        let pairs: Vec<(String, String)> = fields
            .iter()
            .map(|f| (f.name.to_string(), f.value.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (":method".into(), "GET".into()),
                (":scheme".into(), "https".into()),
                (":path".into(), "/index.html".into()),
                (":authority".into(), "www.example.com".into()),
                ("custom-key".into(), "custom-value".into()),
            ]
        );

        let (front_name, front_value) = decoder
            .table
            .resolve(super::super::static_table::DYNAMIC_TABLE_START)
            .unwrap_or_else(|| panic!("dynamic table unexpectedly empty"));
        assert_eq!(&*front_name, "custom-key");
        assert_eq!(&*front_value, "custom-value");
    }

    #[test]
    fn size_update_after_header_is_rejected() {
        let mut decoder = Decoder::new(4096);
        // indexed field (0x82 = :method GET) then a size update (0x20)
        let wire = [0x82u8, 0x20];
        let mut fields = Vec::new();
        assert_eq!(
            decoder.decode(&wire, &mut fields),
            Err(DecoderError::SizeUpdateAfterHeader)
        );
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut decoder = Decoder::new(4096);
        let wire = [0xff, 0xff, 0x7f]; // huge indexed-field index
        let mut fields = Vec::new();
        assert_eq!(decoder.decode(&wire, &mut fields), Err(DecoderError::InvalidIndex));
    }
}
