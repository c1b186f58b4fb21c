pub mod options;

use std::sync::Arc;

use crate::{
    bson::{doc, Bson, Document},
    db::options::DatabaseOptions,
    error::{Error, Result},
    memory::MemoryServer,
    runtime::{self, WorkerPool},
    sync::{self, Connection},
    Database,
};
use self::options::ClientOptions;

/// The methods [`Client::call`] can dispatch to.
const DISPATCHABLE_METHODS: &[&str] = &["drop_database", "list_database_names", "server_info"];

/// This is the main entry point for the API. A `Client` owns a blocking [`sync::Client`] and a
/// bounded worker pool; every async method runs the matching blocking call on the pool and
/// resolves with its result.
///
/// `Client` uses [`std::sync::Arc`] internally, so it can safely be shared across threads or
/// async tasks. For example:
///
/// ```rust
/// # use mongodb_motor::{bson::{doc, Document}, error::Result, Client};
/// #
/// # async fn start_workers() -> Result<()> {
/// let client = Client::in_memory();
///
/// for i in 0..5 {
///     let client_ref = client.clone();
///
///     tokio::task::spawn(async move {
///         let collection = client_ref
///             .database("items")?
///             .collection::<Document>(&format!("coll{}", i));
///         collection.insert_one(doc! { "i": i }).await
///     });
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    delegate: sync::Client,
    pool: WorkerPool,
}

impl Client {
    /// Creates a new `Client` that runs commands over `connection`.
    ///
    /// The worker pool runs at most `options.max_workers` blocking calls at once. When unset, the
    /// limit comes from the `MONGODB_MOTOR_MAX_WORKERS` environment variable, or defaults to
    /// `min(32, available_parallelism + 4)`.
    pub fn with_options(connection: impl Connection, options: ClientOptions) -> Self {
        let max_workers = options
            .max_workers
            .unwrap_or_else(runtime::default_max_workers);

        Self {
            inner: Arc::new(ClientInner {
                delegate: sync::Client::with_options(connection, options),
                pool: WorkerPool::new(max_workers),
            }),
        }
    }

    /// Creates a new `Client` over `connection`, configured from a `mongodb://` connection string.
    pub fn with_uri_str(uri: impl AsRef<str>, connection: impl Connection) -> Result<Self> {
        let options = ClientOptions::parse(uri)?;
        Ok(Self::with_options(connection, options))
    }

    /// Creates a new `Client` backed by a fresh [`MemoryServer`].
    pub fn in_memory() -> Self {
        Self::with_options(MemoryServer::new(), ClientOptions::default())
    }

    /// The wrapped blocking client.
    pub fn delegate(&self) -> &sync::Client {
        &self.inner.delegate
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        self.inner.delegate.options()
    }

    /// The most blocking calls this client runs at once.
    pub fn max_workers(&self) -> usize {
        self.inner.pool.max_workers()
    }

    /// Gets a handle to the database specified by `name`, with options inherited from this
    /// client.
    ///
    /// This method does not send anything to the server. It fails if `name` is not a valid
    /// database name.
    pub fn database(&self, name: &str) -> Result<Database> {
        Ok(Database::from_delegate(self.clone(), self.delegate().database(name)?))
    }

    /// Gets a handle to the database specified by `name`, with the set fields of `options`
    /// replacing this client's.
    pub fn database_with_options(&self, name: &str, options: DatabaseOptions) -> Result<Database> {
        Ok(Database::from_delegate(
            self.clone(),
            self.delegate().database_with_options(name, options)?,
        ))
    }

    /// Gets a handle to the database named in the connection string, if one was given.
    pub fn default_database(&self) -> Option<Result<Database>> {
        self.options()
            .default_database
            .as_deref()
            .map(|name| self.database(name))
    }

    /// Gets the names of all databases in the deployment.
    pub async fn list_database_names(&self) -> Result<Vec<String>> {
        let delegate = self.delegate().clone();
        self.execute("list_database_names", move || delegate.list_database_names())
            .await
    }

    /// Drops the database `name`, deleting all of its collections.
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        self.database(name)?.drop().await
    }

    /// Gets the deployment's build information.
    pub async fn server_info(&self) -> Result<Document> {
        let delegate = self.delegate().clone();
        self.execute("server_info", move || delegate.server_info())
            .await
    }

    /// Invokes the method called `method` with positional `args`.
    ///
    /// Only the operations that take plain BSON arguments can be dispatched this way. An unknown
    /// `method` fails with [`ErrorKind::NoSuchMethod`](crate::error::ErrorKind::NoSuchMethod).
    pub async fn call(&self, method: &str, args: Vec<Bson>) -> Result<Bson> {
        match method {
            "list_database_names" => Ok(Bson::from(self.list_database_names().await?)),
            "server_info" => Ok(Bson::Document(self.server_info().await?)),
            "drop_database" => {
                let name = string_argument("drop_database", "name", args.first())?;
                self.drop_database(name).await.map(|_| Bson::Null)
            }
            _ => Err(Error::no_such_method("Client", method, DISPATCHABLE_METHODS)),
        }
    }

    /// Ends the client's implicit session and stops accepting operations. Every async operation
    /// started afterwards fails with [`ErrorKind::Shutdown`](crate::error::ErrorKind::Shutdown);
    /// blocking calls already running finish normally.
    pub async fn close(&self) {
        if self.inner.pool.is_closed() {
            return;
        }

        let delegate = self.delegate().clone();
        let end_sessions = self.execute("close", move || {
            let session_id = delegate.session_id().clone();
            delegate.execute_command("admin", doc! { "endSessions": [session_id] })
        });
        if let Err(error) = end_sessions.await {
            tracing::debug!(
                target: crate::trace::COMMAND_TRACING_EVENT_TARGET,
                failure = %error,
                "Failed to end implicit session"
            );
        }
        self.inner.pool.close();
    }

    /// Whether [`Client::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    /// Runs `call` on this client's worker pool.
    pub(crate) async fn execute<F, T>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.pool.execute(operation, call).await
    }
}

/// Reads a string argument for a name-dispatched call.
pub(crate) fn string_argument<'a>(
    method: &str,
    parameter: &str,
    arg: Option<&'a Bson>,
) -> Result<&'a str> {
    match arg {
        Some(Bson::String(value)) => Ok(value),
        Some(other) => Err(Error::invalid_type(format!(
            "{}() argument '{}' must be a string, not {}",
            method,
            parameter,
            crate::bson_util::type_name(other)
        ))),
        None => Err(Error::invalid_type(format!(
            "{}() missing required argument '{}'",
            method, parameter
        ))),
    }
}
