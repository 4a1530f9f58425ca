//! The persistence core: connection, staging, retry, deletion filter,
//! garbage collector, and the facade that wires them together.

mod config;
mod connection;
mod cursor;
mod filter;
mod gc;
mod locks;
mod retry;
mod sequence;
mod session;
mod staging;
mod store;

pub use config::StoreConfig;
pub use connection::Connection;
pub use cursor::TripleCursor;
pub use gc::{GcDependency, GcStats};
pub use store::Store;
