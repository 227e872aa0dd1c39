//! Property test: for any sequence of header blocks pushed through an
//! [`Encoder`]/[`Decoder`] pair sharing the same dynamic table budget, each
//! block decodes back to the same `(name, value)` pairs it was encoded
//! from, and the two sides' dynamic tables stay byte-identical afterward.

use bytes::BytesMut;
use quickcheck::Arbitrary;

use super::{Decoder, Encoder, HeaderField};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz-:/.0123456789";

fn arbitrary_string(g: &mut quickcheck::Gen) -> String {
    let len = usize::arbitrary(g) % 12;
    (0..len)
        .map(|_| {
            let idx = usize::arbitrary(g) % ALPHABET.len();
            ALPHABET[idx] as char
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Block(Vec<(String, String)>);

impl quickcheck::Arbitrary for Block {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let count = usize::arbitrary(g) % 6;
        Block(
            (0..count)
                .map(|_| (arbitrary_string(g), arbitrary_string(g)))
                .collect(),
        )
    }
}

/// Any sequence of header blocks round-trips name/value-for-name/value
/// (indexing policy is an encoder-side hint, not part of the wire contract
/// the decoder recovers), and the two sides' tables never diverge.
fn prop(blocks: Vec<Block>) -> bool {
    let mut encoder = Encoder::new(4096);
    let mut decoder = Decoder::new(4096);

    for block in blocks {
        let headers: Vec<HeaderField> = block
            .0
            .iter()
            .map(|(name, value)| HeaderField::new(name.clone(), value.clone()))
            .collect();

        let mut wire = BytesMut::new();
        encoder.encode(&headers, &mut wire);

        let mut decoded = Vec::new();
        if decoder.decode(&wire, &mut decoded).is_err() {
            return false;
        }

        let decoded_pairs: Vec<(String, String)> = decoded
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_string()))
            .collect();
        if decoded_pairs != block.0 {
            return false;
        }
        if encoder.dynamic_table() != decoder.dynamic_table() {
            return false;
        }
    }
    true
}

#[test]
fn decode_of_encode_reproduces_headers_and_keeps_tables_in_sync() {
    quickcheck::quickcheck(prop as fn(Vec<Block>) -> bool);
}
