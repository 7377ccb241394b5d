//! Network Module
//!
//! TCP document server.
//!
//! ## Architecture
//! - Single acceptor loop
//! - One thread per connection
//! - Commands served from a `DocumentGateway` backend

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
