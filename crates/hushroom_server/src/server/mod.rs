#![forbid(unsafe_code)]

pub mod acceptor;
pub mod connection;
pub mod context;
pub mod handshake;
pub mod health;
pub mod membership;
pub mod registry;
pub mod router;
