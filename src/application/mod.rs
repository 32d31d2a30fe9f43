//! Application services: collaborator seams and the render pipeline.

pub mod captions;
pub mod error;
pub mod invoker;
pub mod pipeline;
pub mod store;
