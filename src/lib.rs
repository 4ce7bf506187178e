//! Training-result derivation and workflow playback for the ML training
//! console.
//!
//! ```text
//! RawResult ──► DerivedMetrics ──┐
//!                                ├──► present() ──► ViewModel
//! Catalog ──► Workflow ──► Sequencer (PlaybackState) ┘
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod playback;
pub mod present;
pub mod result;
