//! # tev-client
//!
//! Blocking client for the tev image viewer's IPC port.
//!
//! - **`session`** – [`Session`]: one TCP stream, the registry of images it
//!   created, and the register / push / close / open / reload operations.
//!
//! - **`config`** – [`ClientConfig`]: the TOML file `tev-push` reads its
//!   endpoint and session settings from.
//!
//! Packet encoding, channel naming and row-block scheduling live in
//! [`tev_core`], which is re-exported.

pub mod config;
pub mod session;

pub use config::{ClientConfig, ConfigError};
pub use session::{
    show_image, show_image_at, Session, SessionConfig, SessionError, SessionState, Transport,
};
pub use tev_core;
