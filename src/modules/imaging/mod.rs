//! Image processing module
//!
//! Wraps the `image` crate behind the `Transcoder` seam used by uploads.

mod transcoder;

pub use transcoder::{JpegTranscoder, TranscodeError, TranscodedImage, Transcoder};
