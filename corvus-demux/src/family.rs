//! Protocol families an `AppSocketDemux` can route a connection to (spec
//! §4.5), plus the per-read verdict a [`Matcher`] returns.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Tls,
    Http2,
    Byte,
}

/// A matcher's verdict after inspecting the bytes buffered so far for one
/// family. Ordered so `Preferred` beats `Supported` beats `Unsupported`
/// when picking a winner (spec §4.5's match algorithm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Not enough bytes yet to decide either way.
    Unknown,
    /// This family is this connection's de-facto answer; e.g. the HTTP/2
    /// preface matched exactly.
    Preferred,
    /// This family could handle the bytes, but isn't a strong signal (the
    /// hard-coded byte matcher's fallback).
    Supported,
    /// These bytes are definitely not this family.
    Unsupported,
}

impl MatchResult {
    fn rank(self) -> u8 {
        match self {
            Self::Preferred => 2,
            Self::Supported => 1,
            Self::Unknown | Self::Unsupported => 0,
        }
    }

    pub fn is_better_than(self, other: Self) -> bool {
        self.rank() > other.rank()
    }
}

/// Given `(family, bytes_so_far)`, decide whether this connection speaks
/// that family.
pub trait Matcher: Send + Sync {
    fn matches(&self, bytes_so_far: &[u8]) -> MatchResult;
}
