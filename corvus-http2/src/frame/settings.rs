//! `SETTINGS` frame (RFC 7540 §6.5): a sequence of 6-byte `(id, value)`
//! pairs, or an empty `ACK`. Unknown setting ids are logged and ignored
//! per spec.

use bytes::BufMut;
use tracing::trace;

use super::head::{Head, Kind};
use super::{Error, FrameSize, StreamId};

pub const DEFAULT_SETTINGS_HEADER_TABLE_SIZE: u32 = 4_096;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: FrameSize = 16_384;
const MAX_INITIAL_WINDOW_SIZE: u32 = (1 << 31) - 1;
pub const MAX_MAX_FRAME_SIZE: FrameSize = (1 << 24) - 1;

const ACK: u8 = 0x1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
    EnableConnectProtocol,
    Unknown(u16),
}

impl SettingId {
    fn from_u16(id: u16) -> Self {
        match id {
            0x1 => Self::HeaderTableSize,
            0x2 => Self::EnablePush,
            0x3 => Self::MaxConcurrentStreams,
            0x4 => Self::InitialWindowSize,
            0x5 => Self::MaxFrameSize,
            0x6 => Self::MaxHeaderListSize,
            0x8 => Self::EnableConnectProtocol,
            other => Self::Unknown(other),
        }
    }
}

/// The negotiated values of one side's `SETTINGS`. `None` means "use the
/// RFC default", matching the teacher's own optional-field settings
/// config shape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsConfig {
    pub header_table_size: Option<u32>,
    pub enable_push: Option<bool>,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
    pub enable_connect_protocol: Option<bool>,
}

impl SettingsConfig {
    pub fn header_table_size(&self) -> u32 {
        self.header_table_size.unwrap_or(DEFAULT_SETTINGS_HEADER_TABLE_SIZE)
    }

    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// RFC 7540 §6.5.2 default is `1` (push enabled) until `SETTINGS`
    /// explicitly disables it.
    pub fn enable_push(&self) -> bool {
        self.enable_push.unwrap_or(true)
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Settings {
    ack: bool,
    pub config: SettingsConfig,
}

impl Settings {
    pub fn ack() -> Self {
        Self {
            ack: true,
            config: SettingsConfig::default(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(head.kind(), Kind::Settings);
        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        if head.flags() & ACK != 0 {
            if !payload.is_empty() {
                return Err(Error::InvalidPayloadLength);
            }
            return Ok(Self::ack());
        }
        if payload.len() % 6 != 0 {
            return Err(Error::InvalidPayloadLength);
        }

        let mut settings = Self::default();
        for raw in payload.chunks(6) {
            let id = SettingId::from_u16(u16::from_be_bytes([raw[0], raw[1]]));
            let value = u32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]);
            match id {
                SettingId::HeaderTableSize => settings.config.header_table_size = Some(value),
                SettingId::EnablePush => match value {
                    0 | 1 => settings.config.enable_push = Some(value == 1),
                    _ => return Err(Error::InvalidSettingValue),
                },
                SettingId::MaxConcurrentStreams => {
                    settings.config.max_concurrent_streams = Some(value)
                }
                SettingId::InitialWindowSize => {
                    if value > MAX_INITIAL_WINDOW_SIZE {
                        return Err(Error::InvalidSettingValue);
                    }
                    settings.config.initial_window_size = Some(value);
                }
                SettingId::MaxFrameSize => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                        return Err(Error::InvalidSettingValue);
                    }
                    settings.config.max_frame_size = Some(value);
                }
                SettingId::MaxHeaderListSize => settings.config.max_header_list_size = Some(value),
                SettingId::EnableConnectProtocol => match value {
                    0 | 1 => settings.config.enable_connect_protocol = Some(value == 1),
                    _ => return Err(Error::InvalidSettingValue),
                },
                SettingId::Unknown(id) => {
                    trace!(%id, value, "ignoring unknown SETTINGS id");
                }
            }
        }
        Ok(settings)
    }

    fn for_each(&self, mut f: impl FnMut(u16, u32)) {
        let c = &self.config;
        if let Some(v) = c.header_table_size {
            f(0x1, v);
        }
        if let Some(v) = c.enable_push {
            f(0x2, v as u32);
        }
        if let Some(v) = c.max_concurrent_streams {
            f(0x3, v);
        }
        if let Some(v) = c.initial_window_size {
            f(0x4, v);
        }
        if let Some(v) = c.max_frame_size {
            f(0x5, v);
        }
        if let Some(v) = c.max_header_list_size {
            f(0x6, v);
        }
        if let Some(v) = c.enable_connect_protocol {
            f(0x8, v as u32);
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(
            Kind::Settings,
            if self.ack { ACK } else { 0 },
            StreamId::zero(),
        );
        if self.ack {
            head.encode(0, dst);
            return;
        }
        let mut len = 0usize;
        self.for_each(|_, _| len += 6);
        trace!(len, "encoding SETTINGS");
        head.encode(len, dst);
        self.for_each(|id, value| {
            dst.put_u16(id);
            dst.put_u32(value);
        });
    }
}

impl From<Settings> for super::Frame {
    fn from(settings: Settings) -> Self {
        Self::Settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn empty_settings_round_trips() {
        let settings = Settings::default();
        let mut buf = BytesMut::new();
        settings.encode(&mut buf);
        let (head, len) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        assert_eq!(head.kind(), Kind::Settings);
        assert_eq!(len, 0);
        let decoded = Settings::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(decoded, settings);
    }

    #[test]
    fn ack_has_no_payload() {
        let ack = Settings::ack();
        let mut buf = BytesMut::new();
        ack.encode(&mut buf);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[4] & ACK, ACK);
    }

    #[test]
    fn invalid_initial_window_size_is_rejected() {
        let head = Head::new(Kind::Settings, 0, StreamId::zero());
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x4u16.to_be_bytes());
        payload.extend_from_slice(&(MAX_INITIAL_WINDOW_SIZE + 1).to_be_bytes());
        assert_eq!(
            Settings::load(head, &payload),
            Err(Error::InvalidSettingValue)
        );
    }
}
