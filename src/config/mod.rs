//! Building connection parameters and retry policies from outside input
//!
//! * [`ConnectionInfo`]: `postgres://` URLs
//! * [`BootstrapSettings`]: JSON documents and the process environment

mod connection_string;
mod settings;

pub use connection_string::ConnectionInfo;
pub use settings::BootstrapSettings;
