//! Socket Bridge (spec.md §4.4) — marries a child process's interactive I/O
//! (stdio pipes or a PTY) to a TCP listening socket so every wrapped tool
//! behaves like a CI reachable at `127.0.0.1:<port>`.

pub mod adapter;
pub mod bridge;
pub mod delimiter;
pub mod error;
pub mod framing;
pub mod os_injection;
pub mod pty;
pub mod signals;
pub mod stdio;

pub use adapter::{AdapterRegistry, AdapterSpec, BridgeMode};
pub use bridge::{SocketBridge, TERMINATE_GRACE};
pub use delimiter::parse_delimiter;
pub use error::{BridgeError, BridgeResult};
