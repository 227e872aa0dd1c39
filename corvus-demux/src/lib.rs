//! AppSocket protocol demultiplexing (spec §4.5): sniff the first bytes of
//! an accepted connection to decide which protocol family it speaks, then
//! hand it off to that family's handler without the caller ever seeing the
//! buffering in between.

pub mod byte_matcher;
pub mod demux;
pub mod family;
pub mod http2_factory;

pub use demux::{AppSocketDemux, DemuxConfig, DemuxListener, Factory};
pub use family::{Family, MatchResult, Matcher};
pub use http2_factory::Http2Factory;
