//! Course downloader core: catalog resolution, adaptive-quality
//! negotiation, resumable segmented transfer and mux orchestration.
//!
//! All network and muxer access goes through the [`client::Fetch`] and
//! [`mux::Muxer`] seams, so the whole pipeline runs against fakes in tests.

pub mod captions;
pub mod catalog;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod filename;
pub mod mux;
pub mod playlist;
pub mod progress;
pub mod quality;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{Container, DownloadConfig, Endpoints, RetryPolicy};
pub use downloader::{CourseDownloader, DownloadSummary};
pub use error::{Error, Result};
