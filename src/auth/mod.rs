//! Authentication mechanisms

mod scram;

pub use scram::{ScramError, ScramSha256};
