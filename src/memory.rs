//! An in-process deployment that answers the commands this crate sends.
//!
//! [`MemoryServer`] implements [`Connection`] over plain in-memory state, so clients can be used
//! without a running server. It supports the command subset the handles in this crate issue,
//! a small query language (equality on dotted paths and the common comparison, set and logical
//! operators) and a handful of aggregation stages. Data lives only as long as the server value
//! and its clones.

mod command;
mod pipeline;
mod query;
mod store;

use std::sync::{Arc, Mutex};

use self::store::Store;
use crate::{
    bson::Document,
    error::{Error, Result},
    sync::Connection,
};

/// An in-memory [`Connection`]. Clones share the same data.
///
/// ```rust
/// # use mongodb_motor::{bson::doc, error::Result, memory::MemoryServer, sync::Connection};
/// # fn run() -> Result<()> {
/// let server = MemoryServer::new();
/// let reply = server.send_command("admin", doc! { "ping": 1 })?;
/// assert_eq!(reply.get_f64("ok").ok(), Some(1.0));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryServer {
    store: Arc<Mutex<Store>>,
}

impl MemoryServer {
    /// Creates an empty server with no databases.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connection for MemoryServer {
    fn send_command(&self, db: &str, command: Document) -> Result<Document> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| Error::internal("memory server state was poisoned by a panic"))?;
        Ok(command::run(&mut store, db, command))
    }
}
