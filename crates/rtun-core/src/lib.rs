//! Shared protocol, relay primitive, ID generation, and error types used by
//! both the reverse tunnel server and client.

pub mod error;
pub mod id;
pub mod protocol;
pub mod relay;

pub use error::{RtunError, RtunResult};
pub use id::IdGenerator;
pub use protocol::Message;
