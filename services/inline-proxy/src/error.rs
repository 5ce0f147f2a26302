use dbwire_codec::FrameError;

/// Errors that terminate a single inline-proxy session. Never crosses a
/// session boundary — the accept loop logs it and moves on to the next
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}
