//! Infrastructure adapters and runtime bootstrap.

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod http;
pub mod params;
pub mod telemetry;
