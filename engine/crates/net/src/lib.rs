//! Push channel: per-player bounded delivery queues, the JSON wire protocol,
//! and the WebSocket endpoint that drains them.

pub mod channels;
pub mod protocol;
pub mod push_hub;
pub mod web_server;

pub use channels::{net_channel, DisconnectCause, NetEvent, NetRx, NetTx};
pub use protocol::{ClientMessage, PushEvent, PushMessage};
pub use push_hub::{PushHandle, PushHub, SendOutcome, DEFAULT_QUEUE_CAPACITY};
pub use web_server::{push_routes, PushConfig, PushState};
