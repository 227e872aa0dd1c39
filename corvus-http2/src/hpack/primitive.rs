//! RFC 7541 §5.1/§5.2 primitives: N-bit prefix integers and octet/Huffman
//! strings. Shared by both the encoder and decoder so the two stay in sync
//! on edge cases (prefix overflow, continuation byte limits).

use bytes::{Buf, BufMut};

use super::huffman;

/// An integer requiring more continuation bytes than we're willing to
/// parse; guards against a hostile peer sending an unbounded varint.
const MAX_CONTINUATION_BYTES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveError {
    TruncatedInteger,
    TruncatedString,
    IntegerOverflow,
    Huffman,
}

impl From<huffman::HuffmanError> for PrimitiveError {
    fn from(_: huffman::HuffmanError) -> Self {
        Self::Huffman
    }
}

/// Encode `value` using an `prefix_bits`-bit prefix into the low bits of
/// `first_byte`, OR'd with any already-set high bits (the instruction
/// opcode), per RFC 7541 §5.1.
pub(crate) fn encode_int(value: u64, prefix_bits: u8, first_byte: u8, out: &mut impl BufMut) {
    let max_prefix = (1u64 << prefix_bits) - 1;
    if value < max_prefix {
        out.put_u8(first_byte | value as u8);
        return;
    }
    out.put_u8(first_byte | max_prefix as u8);
    let mut remainder = value - max_prefix;
    while remainder >= 128 {
        out.put_u8(((remainder % 128) | 0x80) as u8);
        remainder /= 128;
    }
    out.put_u8(remainder as u8);
}

/// Decode an N-bit prefix integer. `buf`'s first byte's low `prefix_bits`
/// bits are the seed value; the high bits (the instruction opcode) have
/// already been consumed by the caller and are not re-read here.
pub(crate) fn decode_int(first_byte: u8, prefix_bits: u8, buf: &mut impl Buf) -> Result<u64, PrimitiveError> {
    let max_prefix = (1u64 << prefix_bits) - 1;
    let seed = (first_byte as u64) & max_prefix;
    if seed < max_prefix {
        return Ok(seed);
    }

    let mut value = max_prefix;
    let mut shift = 0u32;
    for i in 0..MAX_CONTINUATION_BYTES {
        if !buf.has_remaining() {
            return Err(PrimitiveError::TruncatedInteger);
        }
        let byte = buf.get_u8();
        let continuation = (byte & 0x80) != 0;
        let payload = (byte & 0x7f) as u64;
        value = value
            .checked_add(payload << shift)
            .ok_or(PrimitiveError::IntegerOverflow)?;
        if !continuation {
            return Ok(value);
        }
        shift += 7;
        if i == MAX_CONTINUATION_BYTES - 1 {
            return Err(PrimitiveError::IntegerOverflow);
        }
    }
    Err(PrimitiveError::TruncatedInteger)
}

/// Encode a string literal: a 1-bit Huffman flag, a 7-bit-prefixed length,
/// then either raw octets or the Huffman-coded octets, whichever the
/// caller chose (the encoder always prefers Huffman when it is smaller).
pub(crate) fn encode_string(value: &[u8], huffman: bool, out: &mut impl BufMut) {
    if huffman {
        let len = huffman::encoded_len(value);
        encode_int(len as u64, 7, 0x80, out);
        let mut buf = Vec::with_capacity(len);
        huffman::encode(value, &mut buf);
        out.put_slice(&buf);
    } else {
        encode_int(value.len() as u64, 7, 0x00, out);
        out.put_slice(value);
    }
}

/// Decode a string literal, returning its decoded bytes.
pub(crate) fn decode_string(buf: &mut impl Buf) -> Result<Vec<u8>, PrimitiveError> {
    if !buf.has_remaining() {
        return Err(PrimitiveError::TruncatedString);
    }
    let is_huffman = buf.chunk()[0] & 0x80 != 0;
    let first_byte = buf.get_u8();
    let len = decode_int(first_byte, 7, buf)? as usize;
    if buf.remaining() < len {
        return Err(PrimitiveError::TruncatedString);
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    if is_huffman {
        Ok(huffman::decode(&raw)?)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integer_fits_in_prefix() {
        let mut out = Vec::new();
        encode_int(10, 5, 0, &mut out);
        assert_eq!(out, vec![10]);
        let mut buf = &out[1..];
        assert_eq!(decode_int(out[0], 5, &mut buf), Ok(10));
    }

    #[test]
    fn rfc7541_example_1337_with_5bit_prefix() {
        // RFC 7541 C.1.2: 1337 encoded with a 5-bit prefix is 0x1f 0x9a 0x0a
        let mut out = Vec::new();
        encode_int(1337, 5, 0, &mut out);
        assert_eq!(out, vec![0x1f, 0x9a, 0x0a]);
        let mut buf = &out[1..];
        assert_eq!(decode_int(out[0], 5, &mut buf), Ok(1337));
    }

    #[test]
    fn integer_overflow_is_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let mut buf = &bytes[1..];
        assert_eq!(
            decode_int(bytes[0], 5, &mut buf),
            Err(PrimitiveError::IntegerOverflow)
        );
    }

    #[test]
    fn string_round_trips_without_huffman() {
        let mut out = Vec::new();
        encode_string(b"custom-key", false, &mut out);
        let mut buf = &out[..];
        assert_eq!(decode_string(&mut buf).as_deref(), Ok(&b"custom-key"[..]));
    }

    #[test]
    fn string_round_trips_with_huffman() {
        let mut out = Vec::new();
        encode_string(b"www.example.com", true, &mut out);
        let mut buf = &out[..];
        assert_eq!(
            decode_string(&mut buf).as_deref(),
            Ok(&b"www.example.com"[..])
        );
    }
}
