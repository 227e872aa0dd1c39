//! Tunables for an [`crate::HttpConn`], constructed by the embedding
//! application rather than parsed from a CLI or config file (out of scope).

use crate::frame::SettingsConfig;

#[derive(Debug, Clone)]
pub struct Http2Config {
    /// Sent to the peer as this side's initial `SETTINGS`.
    pub local_settings: SettingsConfig,
    /// How many local `SETTINGS` frames may be outstanding (unACKed) before
    /// the connection is treated as unresponsive.
    pub max_unacked_settings: u32,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            local_settings: SettingsConfig::default(),
            max_unacked_settings: 8,
        }
    }
}
