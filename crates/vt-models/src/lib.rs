//! Worker-backed implementations of the inference collaborators.
//!
//! Each model lives in a separate inference worker process reached over
//! HTTP. Loading a model here means asking its worker to load it onto the
//! device; dropping the handle asks the worker to unload it.

mod codec;
mod ffmpeg;
mod reconstruct;
mod swap;
mod worker;

pub use ffmpeg::FfmpegEncoder;
pub use reconstruct::{RemoteReconstructionProvider, RemoteReconstructor, RemoteScene};
pub use swap::{RemoteInpainter, RemoteSegmenter, RemoteSwapProvider};
pub use worker::WorkerClient;
