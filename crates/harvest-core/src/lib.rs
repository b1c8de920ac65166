//! Core domain model and contracts for template harvesting.

pub mod identity;
pub mod model;
pub mod protocol;
pub mod template;

pub use model::*;
pub use protocol::*;
