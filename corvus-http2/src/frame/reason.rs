//! HTTP/2 error codes (RFC 7540 §7), carried on `RST_STREAM` and `GOAWAY`
//! frames and matched by the connection engine to pick between tearing the
//! whole connection down or resetting a single stream (spec §7).

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reason(u32);

macro_rules! reasons {
    ($( $name:ident = $value:expr, $doc:expr; )*) => {
        impl Reason {
            $(
                #[doc = $doc]
                pub const $name: Reason = Reason($value);
            )*
        }

        impl fmt::Debug for Reason {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $( $value => f.write_str(stringify!($name)), )*
                    other => write!(f, "UNKNOWN({other})"),
                }
            }
        }
    };
}

reasons! {
    NO_ERROR = 0x0, "The associated condition is not a result of an error.";
    PROTOCOL_ERROR = 0x1, "The endpoint detected an unspecific protocol error.";
    INTERNAL_ERROR = 0x2, "The endpoint encountered an unexpected internal error.";
    FLOW_CONTROL_ERROR = 0x3, "The endpoint detected a flow-control protocol violation.";
    SETTINGS_TIMEOUT = 0x4, "The endpoint sent a SETTINGS frame and did not receive an ACK in time.";
    STREAM_CLOSED = 0x5, "The endpoint received a frame after the stream was half-closed.";
    FRAME_SIZE_ERROR = 0x6, "The endpoint received a frame with an invalid size.";
    REFUSED_STREAM = 0x7, "The endpoint refused the stream before processing any data.";
    CANCEL = 0x8, "The endpoint no longer has use for the stream.";
    COMPRESSION_ERROR = 0x9, "The endpoint is unable to maintain the header compression context.";
    CONNECT_ERROR = 0xa, "The connection established in response to a CONNECT request failed.";
    ENHANCE_YOUR_CALM = 0xb, "The endpoint detected excessive load from its peer.";
    INADEQUATE_SECURITY = 0xc, "The underlying transport does not meet minimum security requirements.";
    HTTP_1_1_REQUIRED = 0xd, "The endpoint requires HTTP/1.1 for the requested resource.";
}

impl Reason {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<u32> for Reason {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<Reason> for u32 {
    fn from(reason: Reason) -> Self {
        reason.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u32() {
        assert_eq!(Reason::from(0x9), Reason::COMPRESSION_ERROR);
        assert_eq!(u32::from(Reason::CANCEL), 0x8);
    }

    #[test]
    fn unknown_code_debugs_as_unknown() {
        assert_eq!(format!("{:?}", Reason::from(0xff)), "UNKNOWN(255)");
    }
}
