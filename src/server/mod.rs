mod connection;
mod dispatch;

pub use connection::{Connection, ConnectionState};
pub use dispatch::{Dispatcher, DropFilter, RandomDrop, ScriptedDrop};
