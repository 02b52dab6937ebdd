//! Postgres frontend/backend protocol (v3), startup and simple-query subset

pub mod constants;
pub mod decode;
pub mod encode;
mod message;

pub use decode::decode_message;
pub use encode::{encode_into, encode_message};
pub use message::{AuthenticationMessage, BackendMessage, ErrorFields, FrontendMessage};
