/// Errors that can terminate the driver loop outright.
///
/// Unlike the inline proxy's `SessionError`, a `FrameError` on a single
/// packet is never fatal here — the driver logs it and moves to the next
/// packet. Only a `Capture` failure (the source itself going bad) stops
/// the loop.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("capture source: {0}")]
    Capture(#[from] pcap::Error),
}
