//! Real-time event fan-out.
//!
//! One upstream link per registry, shared by any number of named callbacks.

mod registry;
mod transport;
mod types;

pub use registry::{Callback, EventRegistry, redact_url};
pub use transport::{ChannelTransport, EventTransport, TransportStream};
pub use types::{Event, EventError, EventKind, StreamState, Subscription};
