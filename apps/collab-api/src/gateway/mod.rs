pub mod connection;
pub mod events;
pub mod rooms;
pub mod server;
