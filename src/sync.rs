//! Contains the blocking driver layer. Every method here runs to completion on the calling
//! thread; the async handles at the crate root run these calls on a worker pool.

mod client;
mod coll;
mod connection;
mod cursor;
mod db;

pub use client::Client;
pub use coll::Collection;
pub use connection::Connection;
pub use cursor::Cursor;
pub use db::Database;
