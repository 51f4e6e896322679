//! Data Transfer Objects (DTOs) for the document endpoint

pub mod cache;
pub mod xml_curl;

pub use cache::*;
pub use xml_curl::*;
