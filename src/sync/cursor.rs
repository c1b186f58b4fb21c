use std::{collections::VecDeque, fmt, marker::PhantomData};

use serde::de::DeserializeOwned;

use super::Client;
use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    error::{Error, Result},
};

/// A `Cursor` streams the result of a query. When a query is made, a `Cursor` is returned with the
/// first batch of results from the server; the documents are returned as the `Cursor` is
/// iterated. When the batch is exhausted and the server holds more results, the `Cursor` fetches
/// the next batch with a `getMore` command, and so forth until the results are exhausted.
/// Because of this batching, any call to `Cursor::next` may block on the server, so a `Cursor`
/// iterates over `Result<T>` items rather than simply `T` items.
///
/// The batch size of the `Cursor` can be configured using the options to the method that returns
/// it. For example, setting the `batch_size` field of
/// [`FindOptions`](../options/struct.FindOptions.html) sets the batch size of the `Cursor` returned
/// by [`Collection::find`](struct.Collection.html#method.find).
///
/// A cursor can be used like any other `Iterator`:
///
/// ```rust
/// # use mongodb_motor::{bson::{doc, Document}, error::Result, memory::MemoryServer, options::ClientOptions, sync::Client};
/// # fn do_stuff() -> Result<()> {
/// # let client = Client::with_options(MemoryServer::new(), ClientOptions::default());
/// # let coll = client.database("foo")?.collection::<Document>("bar");
/// let results: Vec<Result<Document>> = coll.find(doc! { "x": 1 }, None)?.collect();
/// # Ok(())
/// # }
/// ```
///
/// Dropping a `Cursor` that the server still holds open kills it on the server.
pub struct Cursor<T> {
    client: Client,
    db: String,
    coll: String,
    cursor_id: i64,
    batch_size: Option<u32>,
    buffer: VecDeque<Document>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Cursor<T> {
    /// Builds a cursor from the reply to a cursor-returning command sent to `db`.
    pub(crate) fn from_reply(
        client: Client,
        db: &str,
        reply: &Document,
        batch_size: Option<u32>,
    ) -> Result<Self> {
        let cursor = reply
            .get_document("cursor")
            .map_err(|_| Error::invalid_response("reply is missing a `cursor` document"))?;
        let (cursor_id, ns, first_batch) = parse_cursor(cursor, "firstBatch")?;

        // The namespace of a database-level aggregate is `db.$cmd.aggregate`; getMore expects
        // everything after the database name.
        let coll = ns
            .split_once('.')
            .map(|(_, coll)| coll.to_string())
            .unwrap_or_default();

        Ok(Self {
            client,
            db: db.to_string(),
            coll,
            cursor_id,
            batch_size,
            buffer: first_batch,
            _phantom: PhantomData,
        })
    }

    /// The server-side id of this cursor, or 0 once the server no longer holds it open.
    pub fn id(&self) -> i64 {
        self.cursor_id
    }

    /// Whether every result has been returned and the server holds nothing more.
    pub fn is_exhausted(&self) -> bool {
        self.cursor_id == 0 && self.buffer.is_empty()
    }

    /// Discards buffered results and kills the cursor on the server if it is still open.
    pub fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        if self.cursor_id == 0 {
            return Ok(());
        }

        let cursor_id = std::mem::replace(&mut self.cursor_id, 0);
        self.client
            .execute_command(
                &self.db,
                doc! { "killCursors": self.coll.as_str(), "cursors": [cursor_id] },
            )
            .map(|_| ())
    }

    fn get_more(&mut self) -> Result<()> {
        let mut command = doc! { "getMore": self.cursor_id, "collection": self.coll.as_str() };
        if let Some(batch_size) = self.batch_size {
            command.insert("batchSize", i64::from(batch_size));
        }

        let reply = match self.client.execute_command(&self.db, command) {
            Ok(reply) => reply,
            Err(error) => {
                // A failed getMore leaves nothing on the server worth killing.
                self.cursor_id = 0;
                return Err(error);
            }
        };
        let cursor = reply
            .get_document("cursor")
            .map_err(|_| Error::invalid_response("getMore reply is missing a `cursor` document"))?;
        let (cursor_id, _, next_batch) = parse_cursor(cursor, "nextBatch")?;

        self.cursor_id = cursor_id;
        self.buffer.extend(next_batch);
        Ok(())
    }

    fn next_document(&mut self) -> Option<Result<Document>> {
        while self.buffer.is_empty() && self.cursor_id != 0 {
            if let Err(error) = self.get_more() {
                return Some(Err(error));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl<T> Iterator for Cursor<T>
where
    T: DeserializeOwned,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_document()
            .map(|result| result.and_then(|doc| crate::bson::from_document(doc).map_err(Error::from)))
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        if self.cursor_id != 0 {
            if let Err(error) = self.close() {
                tracing::debug!(
                    target: crate::trace::COMMAND_TRACING_EVENT_TARGET,
                    failure = %error,
                    "Failed to kill cursor on drop"
                );
            }
        }
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("db", &self.db)
            .field("coll", &self.coll)
            .field("cursor_id", &self.cursor_id)
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

fn parse_cursor(cursor: &Document, batch_key: &str) -> Result<(i64, String, VecDeque<Document>)> {
    let cursor_id = cursor
        .get("id")
        .and_then(bson_util::get_int)
        .ok_or_else(|| Error::invalid_response("cursor is missing an integer `id`"))?;
    let ns = cursor.get_str("ns").unwrap_or_default().to_string();
    let batch = cursor
        .get_array(batch_key)
        .map_err(|_| Error::invalid_response(format!("cursor is missing `{}`", batch_key)))?
        .iter()
        .map(|doc| match doc {
            Bson::Document(doc) => Ok(doc.clone()),
            other => Err(Error::invalid_response(format!(
                "cursor batch contains a non-document value: {}",
                other
            ))),
        })
        .collect::<Result<VecDeque<_>>>()?;

    Ok((cursor_id, ns, batch))
}
