//! API Request and Response Types
//!
//! JSON bodies use camelCase keys.

mod opportunity;
pub use opportunity::*;

mod pipeline_stage;
pub use pipeline_stage::*;

mod reorder;
pub use reorder::*;
