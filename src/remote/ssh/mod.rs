// ABOUTME: SSH sessions to fleet hosts using russh.
// ABOUTME: Agent or key-file auth with known_hosts verification; one session per remote call.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Result, SessionError};
