//! Live relay: device call -> segmented HLS playlist
//!
//! The controller requests a call whose media is muxed into a rolling HLS
//! window, then holds the stream back from clients until the prober has
//! seen a real playlist on disk.

pub mod controller;
pub mod mux;
pub mod probe;

pub use controller::{AudioSendOutcome, RelayController, RelayState};
pub use mux::{hls_mux_options, new_session_id, ArtifactPaths};
pub use probe::{ProbeOutcome, ReadinessProber};
