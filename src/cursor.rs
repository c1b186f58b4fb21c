use std::{
    fmt,
    marker::PhantomData,
    sync::{Arc, Mutex, TryLockError},
};

use futures_core::Stream;
use serde::de::DeserializeOwned;

use crate::{
    bson::Document,
    error::{Error, Result},
    sync,
    Client,
};

type StartCursor = Box<dyn FnOnce() -> Result<sync::Cursor<Document>> + Send>;

/// A `Cursor` streams the result of a query or aggregation.
///
/// Cursors are lazy: the command that produces them is not sent until the first read. The first
/// read runs the command on the client's worker pool, and every later read that needs another
/// batch from the server runs its `getMore` there too. Results are returned in server order.
///
/// ```rust
/// # use mongodb_motor::{bson::{doc, Document}, error::Result, Client};
/// # async fn run() -> Result<()> {
/// # let client = Client::in_memory();
/// # let coll = client.database("db")?.collection::<Document>("coll");
/// let mut cursor = coll.find(doc! { "x": { "$gt": 1 } }, None);
/// let first_ten = cursor.to_list(10).await?;
/// while let Some(doc) = cursor.try_next().await? {
///     println!("{}", doc);
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping a `Cursor` that the server still holds open kills the server-side cursor in the
/// background.
pub struct Cursor<T> {
    client: Client,
    operation: &'static str,
    state: Arc<Mutex<CursorState>>,
    _phantom: PhantomData<fn() -> T>,
}

enum CursorState {
    /// The command has not been sent yet.
    Pending(StartCursor),
    Open(sync::Cursor<Document>),
    /// Every result has been returned, or the cursor failed or was closed.
    Exhausted,
}

impl CursorState {
    fn open(&mut self) -> Result<Option<&mut sync::Cursor<Document>>> {
        if let CursorState::Pending(_) = self {
            if let CursorState::Pending(start) = std::mem::replace(self, CursorState::Exhausted) {
                *self = CursorState::Open(start()?);
            }
        }

        match self {
            CursorState::Open(cursor) => Ok(Some(cursor)),
            _ => Ok(None),
        }
    }

    /// Reads up to `limit` documents, or all of them if `limit` is `None`.
    fn fetch(&mut self, limit: Option<usize>) -> Result<Vec<Document>> {
        let cursor = match self.open()? {
            Some(cursor) => cursor,
            None => return Ok(Vec::new()),
        };

        let mut documents = Vec::new();
        let mut failure = None;
        while limit.map_or(true, |limit| documents.len() < limit) {
            match cursor.next() {
                Some(Ok(document)) => documents.push(document),
                Some(Err(error)) => {
                    failure = Some(error);
                    break;
                }
                None => break,
            }
        }

        if failure.is_some() || cursor.is_exhausted() {
            *self = CursorState::Exhausted;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(documents),
        }
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(self, CursorState::Exhausted) {
            CursorState::Open(mut cursor) => cursor.close(),
            _ => Ok(()),
        }
    }
}

fn lock(state: &Mutex<CursorState>) -> Result<std::sync::MutexGuard<'_, CursorState>> {
    state
        .lock()
        .map_err(|_| Error::internal("cursor state was poisoned by a panic"))
}

impl<T> Cursor<T> {
    pub(crate) fn new(
        client: Client,
        operation: &'static str,
        start: impl FnOnce() -> Result<sync::Cursor<Document>> + Send + 'static,
    ) -> Self {
        Self {
            client,
            operation,
            state: Arc::new(Mutex::new(CursorState::Pending(Box::new(start)))),
            _phantom: PhantomData,
        }
    }

    async fn fetch(&self, operation: &'static str, limit: Option<usize>) -> Result<Vec<Document>> {
        let state = self.state.clone();
        self.client
            .execute(operation, move || lock(&state)?.fetch(limit))
            .await
    }

    /// Kills the cursor on the server if it is still open. Later reads return nothing.
    pub async fn close(&mut self) -> Result<()> {
        let state = self.state.clone();
        self.client
            .execute("killCursors", move || lock(&state)?.close())
            .await
    }
}

impl<T> Cursor<T>
where
    T: DeserializeOwned,
{
    /// Reads up to `length` documents, or every remaining document if `length` is `None`.
    ///
    /// A `length` of `Some(0)` returns an empty list. It still sends the cursor's command if it
    /// has not been sent yet, so errors in it surface here, but fetches no results.
    pub async fn to_list(&mut self, length: impl Into<Option<usize>>) -> Result<Vec<T>> {
        let operation = self.read_operation();
        self.fetch(operation, length.into())
            .await?
            .into_iter()
            .map(|doc| crate::bson::from_document(doc).map_err(Error::from))
            .collect()
    }

    /// Reads the next document, or `None` once the cursor is exhausted.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        let operation = self.read_operation();
        self.fetch(operation, Some(1))
            .await?
            .pop()
            .map(|doc| crate::bson::from_document(doc).map_err(Error::from))
            .transpose()
    }

    /// Converts the cursor into a [`Stream`] of its remaining documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures_util::stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.try_next().await?.map(|doc| (doc, cursor)))
        })
    }

    fn read_operation(&self) -> &'static str {
        match self.state.try_lock().as_deref() {
            Ok(CursorState::Pending(_)) => self.operation,
            _ => "getMore",
        }
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        let needs_kill = match self.state.try_lock() {
            Ok(state) => matches!(&*state, CursorState::Open(cursor) if cursor.id() != 0),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        };
        if !needs_kill {
            return;
        }

        // Killing blocks on the server, so it runs on the blocking pool when a runtime is
        // available.
        let state = self.state.clone();
        let kill = move || {
            if let Ok(mut state) = state.lock() {
                let _ = state.close();
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(kill);
            }
            Err(_) => kill(),
        }
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.try_lock().as_deref() {
            Ok(CursorState::Pending(_)) => "pending",
            Ok(CursorState::Open(_)) => "open",
            Ok(CursorState::Exhausted) => "exhausted",
            Err(_) => "busy",
        };
        f.debug_struct("Cursor")
            .field("operation", &self.operation)
            .field("state", &state)
            .finish()
    }
}
