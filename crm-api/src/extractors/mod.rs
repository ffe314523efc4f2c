//! Request extractors with `ApiError`-shaped rejections.

pub mod json_body;
pub mod path_id;

pub use json_body::ApiJson;
pub use path_id::PathId;
