//! HTTP/2 framing (RFC 7540 §4, §6): the 9-byte frame header, the ten
//! standard frame types, and the connection/stream error taxonomy frame
//! parsing can raise.

mod data;
mod go_away;
mod head;
mod headers;
mod ping;
mod priority;
mod reason;
mod reset;
mod settings;
mod stream_id;
mod window_update;

pub use data::Data;
pub use go_away::GoAway;
pub use head::{Head, Kind, HEADER_LEN};
pub use headers::{Continuation, Headers, PushPromise};
pub use ping::Ping;
pub use priority::{Priority, StreamDependency};
pub use reason::Reason;
pub use reset::Reset;
pub use settings::{
    SettingId, Settings, SettingsConfig, DEFAULT_INITIAL_WINDOW_SIZE,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_SETTINGS_HEADER_TABLE_SIZE, MAX_MAX_FRAME_SIZE,
};
pub use stream_id::StreamId;
pub use window_update::WindowUpdate;

use crate::hpack;

/// Maximum payload length a `SETTINGS_MAX_FRAME_SIZE` value may describe.
pub type FrameSize = u32;

/// Errors raised while parsing a frame out of its header and payload bytes.
/// Each variant maps to a [`Reason`] the connection engine attaches to the
/// `RST_STREAM`/`GOAWAY` it emits in response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    BadFrameSize,
    TooMuchPadding,
    InvalidSettingValue,
    InvalidWindowUpdateValue,
    InvalidPayloadLength,
    InvalidPayloadAckSettings,
    InvalidStreamId,
    InvalidDependencyId,
    MalformedMessage,
    Hpack(hpack::DecoderError),
}

impl From<hpack::DecoderError> for Error {
    fn from(err: hpack::DecoderError) -> Self {
        Self::Hpack(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {}

impl Error {
    /// The connection/stream error code this parse failure should be
    /// reported with.
    pub fn reason(&self) -> Reason {
        match self {
            Self::BadFrameSize
            | Self::TooMuchPadding
            | Self::InvalidPayloadLength
            | Self::InvalidPayloadAckSettings => Reason::FRAME_SIZE_ERROR,
            Self::InvalidSettingValue => Reason::PROTOCOL_ERROR,
            Self::InvalidWindowUpdateValue => Reason::FLOW_CONTROL_ERROR,
            Self::InvalidStreamId | Self::InvalidDependencyId | Self::MalformedMessage => {
                Reason::PROTOCOL_ERROR
            }
            Self::Hpack(_) => Reason::COMPRESSION_ERROR,
        }
    }
}

/// A single parsed HTTP/2 frame. `Headers`/`PushPromise`/`Continuation`
/// still carry an undecoded HPACK header-block fragment: decoding only
/// happens once the connection engine has assembled every `CONTINUATION`
/// belonging to the same header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Priority(Priority),
    Reset(Reset),
    Settings(Settings),
    PushPromise(PushPromise),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    Continuation(Continuation),
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::Data(f) => f.stream_id(),
            Self::Headers(f) => f.stream_id(),
            Self::Priority(f) => f.stream_id(),
            Self::Reset(f) => f.stream_id(),
            Self::Settings(_) => StreamId::zero(),
            Self::PushPromise(f) => f.stream_id(),
            Self::Ping(_) => StreamId::zero(),
            Self::GoAway(_) => StreamId::zero(),
            Self::WindowUpdate(f) => f.stream_id(),
            Self::Continuation(f) => f.stream_id(),
        }
    }

    pub fn encode(&self, dst: &mut impl bytes::BufMut) {
        match self {
            Self::Data(f) => f.encode(dst),
            Self::Headers(f) => f.encode(dst),
            Self::Priority(f) => f.encode(dst),
            Self::Reset(f) => f.encode(dst),
            Self::Settings(f) => f.encode(dst),
            Self::PushPromise(f) => f.encode(dst),
            Self::Ping(f) => f.encode(dst),
            Self::GoAway(f) => f.encode(dst),
            Self::WindowUpdate(f) => f.encode(dst),
            Self::Continuation(f) => f.encode(dst),
        }
    }

    /// Parse one frame given its already-split-off header and payload.
    /// `payload.len()` must equal the length the header declared.
    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        Ok(match head.kind() {
            Kind::Data => Self::Data(Data::load(head, payload)?),
            Kind::Headers => Self::Headers(Headers::load(head, payload)?),
            Kind::Priority => Self::Priority(Priority::load(head, payload)?),
            Kind::Reset => Self::Reset(Reset::load(head, payload)?),
            Kind::Settings => Self::Settings(Settings::load(head, payload)?),
            Kind::PushPromise => Self::PushPromise(PushPromise::load(head, payload)?),
            Kind::Ping => Self::Ping(Ping::load(head, payload)?),
            Kind::GoAway => Self::GoAway(GoAway::load(payload)?),
            Kind::WindowUpdate => Self::WindowUpdate(WindowUpdate::load(head, payload)?),
            Kind::Continuation => Self::Continuation(Continuation::load(head, payload)?),
            Kind::Unknown(id) => {
                tracing::trace!(id, "ignoring frame of unknown type");
                return Err(Error::MalformedMessage);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn frame_load_dispatches_on_kind() {
        let ping = Ping::new([9; 8]);
        let mut buf = BytesMut::new();
        ping.encode(&mut buf);
        let (head, len) = Head::parse(&buf[..HEADER_LEN]);
        let frame = Frame::load(head, &buf[HEADER_LEN..HEADER_LEN + len as usize])
            .unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(frame, Frame::Ping(ping));
    }

    #[test]
    fn unknown_frame_kind_is_rejected() {
        let head = Head::new(Kind::Unknown(0xee), 0, StreamId::zero());
        assert_eq!(Frame::load(head, &[]), Err(Error::MalformedMessage));
    }
}
