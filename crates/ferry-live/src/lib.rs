//! # ferry-live
//!
//! Live channels for Ferry.
//!
//! Open pages keep a live channel to the server. Through it the server asks
//! clients to reload after source changes and pushes new states of values
//! the page observes.
//!
//! ## Example
//!
//! ```rust
//! use ferry_live::{Broker, BrokerConfig, ChannelSender, SenderId};
//! use ferry_protocol::{Command, StartId};
//! use std::sync::Arc;
//!
//! let broker = Broker::new(StartId::generate(), BrokerConfig::default());
//! let (sender, mut events) = ChannelSender::channel();
//! broker.add_sender(SenderId::generate(), Arc::new(sender));
//!
//! assert_eq!(broker.broadcast(&Command::Ping), 1);
//! assert_eq!(&events.try_recv().unwrap()[..], b"data: PING\r\n\r\n");
//! ```

pub mod broker;
pub mod sender;
pub mod values;

pub use broker::{AttachOutcome, Broker, BrokerConfig, BrokerStats, SessionParams};
pub use sender::{ChannelSender, EventSender, LiveError, SenderId};
pub use values::{LiveValue, ObservableValue, ObserverFn, Teardown, ValueRegistry, ValueStore};
