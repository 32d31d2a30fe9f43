//! Prompt-to-video render service.
//!
//! A prompt is turned into caption lines by a text model, the captions are
//! written to a per-job parameter document, and an external video engine is
//! run against that document to produce an MP4 served under `/videos/`.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
