//! Trellis CLI Library
//!
//! Terminal interface for administering garden connections: a REST client
//! for the garden API, a websocket transport for the event stream, and the
//! garden subcommands built on `trellis-core`.

pub mod client;
pub mod garden_cmd;
pub mod garden_fmt;
pub mod stream;
