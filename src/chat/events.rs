//! Events pushed to the client during a turn.

/// Client-facing event of a streaming turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Partial model output, forwarded as soon as it is decoded.
    Fragment(String),
    /// Keep-alive sent while the backend is silent.
    Heartbeat,
    /// The backend finished normally.
    Done,
    /// The backend failed; nothing follows.
    Error(String),
}

impl StreamEvent {
    /// Whether no further events follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}
