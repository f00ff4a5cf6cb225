//! Session Layer
//!
//! Async plumbing around the proof system: wire messages, one task per
//! match, and a retrying client. This layer is **non-deterministic**; all
//! game logic runs through `game/` and `proof/`.

pub mod protocol;
pub mod session;
pub mod client;

pub use protocol::{
    Ack, ClientMessage, ServerMessage, MatchEvent, MatchSnapshot, ServerError, ErrorCode,
};
pub use session::{MatchSession, SessionConfig, SessionError, SessionManager};
pub use client::{Client, ClientConfig, ClientError, Transport, TransportError};
