//! Core types and error definitions for qaflow.
//!
//! This crate provides the foundational types shared across all qaflow crates:
//! the error taxonomy used by prompt calls and the run orchestrator, and the
//! media attachment type carried by multimodal prompts.
//!
//! # Main types
//!
//! - [`QaError`] - Unified error enum for all qaflow subsystems.
//! - [`QaResult`] - Convenience alias for `Result<T, QaError>`.
//! - [`MediaAttachment`] - Binary payload (e.g. a screen recording) sent
//!   alongside a rendered prompt.

/// Error taxonomy shared by every crate in the workspace.
pub mod error;
/// Inline media attachments and `data:` URI handling.
pub mod media;

pub use error::{QaError, QaResult};
pub use media::MediaAttachment;
