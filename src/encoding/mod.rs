//! Frame sampling and payload encoding.
//!
//! Sampling is lossy and best-effort: each tick captures at most one
//! frame, and a frame that cannot be sent right away is dropped rather
//! than queued.

mod jpeg;
mod sampler;

pub use jpeg::{decode_payload, EncodeError, FrameEncoder, DEFAULT_JPEG_QUALITY};
pub use sampler::SamplingTimer;
