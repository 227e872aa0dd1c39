//! The hard-coded byte matcher (spec §4.5): used for any family with no
//! application-registered [`crate::family::Matcher`]. Recognizes the
//! HTTP/2 connection preface and a TLS record-layer handshake prefix;
//! anything else is `Byte`-supported.

use crate::family::{Family, MatchResult};

/// TLS record layer: content type `handshake` (0x16), then a 2-byte
/// version (`0x03 0x0?` across SSLv3 through TLS 1.3, all negotiated via
/// the same record header).
const TLS_HANDSHAKE_PREFIX: [u8; 1] = [0x16];
const TLS_VERSION_MAJOR: u8 = 0x03;

pub fn matches(family: Family, bytes_so_far: &[u8]) -> MatchResult {
    match family {
        Family::Http2 => match_http2_preface(bytes_so_far),
        Family::Tls => match_tls_prefix(bytes_so_far),
        Family::Byte => MatchResult::Supported,
    }
}

fn match_http2_preface(buf: &[u8]) -> MatchResult {
    if corvus_http2::is_complete_preface(buf) {
        return MatchResult::Preferred;
    }
    if corvus_http2::is_preface_prefix(buf) {
        return MatchResult::Unknown;
    }
    MatchResult::Unsupported
}

fn match_tls_prefix(buf: &[u8]) -> MatchResult {
    if buf.is_empty() {
        return MatchResult::Unknown;
    }
    if buf[0] != TLS_HANDSHAKE_PREFIX[0] {
        return MatchResult::Unsupported;
    }
    if buf.len() < 2 {
        return MatchResult::Unknown;
    }
    if buf[1] != TLS_VERSION_MAJOR {
        return MatchResult::Unsupported;
    }
    MatchResult::Preferred
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_http2_preface_is_preferred() {
        assert_eq!(
            matches(Family::Http2, corvus_http2::PREFACE),
            MatchResult::Preferred
        );
    }

    #[test]
    fn partial_http2_preface_is_unknown_not_unsupported() {
        assert_eq!(matches(Family::Http2, b"PRI * HTTP"), MatchResult::Unknown);
    }

    #[test]
    fn http_1_1_request_is_unsupported_for_http2() {
        assert_eq!(
            matches(Family::Http2, b"GET / HTTP/1.1\r\n"),
            MatchResult::Unsupported
        );
    }

    #[test]
    fn tls_handshake_prefix_is_preferred() {
        assert_eq!(matches(Family::Tls, &[0x16, 0x03, 0x01]), MatchResult::Preferred);
    }

    #[test]
    fn non_tls_byte_is_unsupported_for_tls() {
        assert_eq!(matches(Family::Tls, &[0x47]), MatchResult::Unsupported);
    }

    #[test]
    fn byte_family_always_supported() {
        assert_eq!(matches(Family::Byte, &[]), MatchResult::Supported);
    }
}
