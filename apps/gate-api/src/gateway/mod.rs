pub mod channel;
pub mod events;
pub mod handler;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;
