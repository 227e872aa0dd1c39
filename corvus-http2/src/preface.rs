//! The HTTP/2 connection preface (RFC 7540 §3.5): a fixed 24-byte sequence
//! every client must send before any frame, so a server (or a protocol
//! sniffer sitting in front of one) can recognize an HTTP/2 connection
//! attempt without ambiguity.

pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// `true` once `buf` is a prefix of the 24-byte preface (including an exact
/// match); `false` as soon as a byte disagrees. A demultiplexer can call
/// this as bytes trickle in without buffering a full preface first.
pub fn is_preface_prefix(buf: &[u8]) -> bool {
    let n = buf.len().min(PREFACE.len());
    buf[..n] == PREFACE[..n]
}

pub fn is_complete_preface(buf: &[u8]) -> bool {
    buf.len() >= PREFACE.len() && &buf[..PREFACE.len()] == PREFACE
}
