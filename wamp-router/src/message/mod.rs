pub mod common;
pub mod fields;
pub mod message;
