//! # ferry-protocol
//!
//! Shared vocabulary of the Ferry rendering runtime.
//!
//! This crate defines the values that cross the boundary between server
//! request handling, client navigation and live channels:
//!
//! - **Route** - canonical, immutable route representation
//! - **RenderMethod** - how content is produced and who owns it
//! - **Command** - live-channel commands and their event-stream codec
//! - **StartId** - server start identity for the hot-reload handshake
//!
//! ## Example
//!
//! ```rust
//! use ferry_protocol::{routes_equal, codec, Command};
//!
//! assert!(routes_equal("/docs/", "https://example.org/docs"));
//!
//! let encoded = codec::encode(&Command::Reload).unwrap();
//! assert_eq!(codec::decode(&encoded).unwrap(), Command::Reload);
//! ```

pub mod codec;
pub mod render;
pub mod route;
pub mod start_id;

pub use codec::{CodecError, Command};
pub use render::{RenderMethod, UnknownRenderMethod};
pub use route::{is_child_of, parse_route, routes_equal, IntoRoute, InvalidRouteError, Route};
pub use start_id::{StartId, StartIdCheck};
