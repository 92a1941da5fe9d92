#![forbid(unsafe_code)]

pub mod config;
pub mod server;

pub use server::acceptor::Server;
pub use server::connection::ConnectionSettings;
pub use server::context::ServerContext;
pub use server::registry::RoomRegistry;
