pub mod client;
pub mod frame;
pub mod observer;
pub mod server;
