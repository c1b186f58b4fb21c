use std::{fmt::Debug, sync::Arc};

use crate::{bson::Document, error::Result};

/// A channel to a deployment that can execute database commands.
///
/// This is the seam between the driver and whatever actually runs commands: a network
/// connection pool, an in-process [`MemoryServer`](crate::memory::MemoryServer), or a test
/// double. Implementations must be safe to call from several threads at once; calls are
/// blocking and are made from the worker pool, never from the async executor.
///
/// A reply whose `ok` field is not `1` is a server-side failure and should be returned as
/// `Ok(reply)`; the driver turns it into the appropriate error. `Err` is reserved for failures
/// to deliver the command or receive a reply at all.
pub trait Connection: Send + Sync + Debug + 'static {
    /// Runs `command` against the database named `db` and returns the server's reply.
    fn send_command(&self, db: &str, command: Document) -> Result<Document>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn send_command(&self, db: &str, command: Document) -> Result<Document> {
        (**self).send_command(db, command)
    }
}
