pub mod options;

use std::convert::TryFrom;

use crate::{
    bson::{Bson, Document},
    client::string_argument,
    codec::CodecOptions,
    coll::options::{AggregateOptions, CollectionOptions},
    concern::WriteConcern,
    error::{Error, Result},
    read_preference::ReadPreference,
    sync,
    Client,
    Collection,
    Cursor,
};
use self::options::{CreateCollectionOptions, DatabaseOptions, ValidateOptions};

/// The methods [`Database::call`] can dispatch to.
const DISPATCHABLE_METHODS: &[&str] = &[
    "command",
    "create_collection",
    "drop_collection",
    "list_collection_names",
    "validate_collection",
];

/// `Database` is the client-side abstraction of a MongoDB database. It can be used to perform
/// database-level operations or to obtain handles to specific collections within the database. A
/// `Database` can only be obtained through a [`Client`](struct.Client.html) by calling either
/// [`Client::database`](struct.Client.html#method.database) or
/// [`Client::database_with_options`](struct.Client.html#method.database_with_options).
///
/// Every async method runs the matching [`sync::Database`] method on the client's worker pool.
/// `Database` is cheap to clone, so functionality can be layered on top of it by wrapping it in
/// another type:
///
/// ```rust
/// # use mongodb_motor::{bson::{doc, Document}, error::Result, Client, Database};
/// struct Inventory {
///     db: Database,
/// }
///
/// impl Inventory {
///     async fn ping(&self) -> Result<Document> {
///         self.db.command(doc! { "ping": 1 }).await
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Database {
    client: Client,
    delegate: sync::Database,
}

impl Database {
    /// Gets a handle to the database `name` on `client`. Equivalent to
    /// [`Client::database`].
    pub fn new(client: &Client, name: &str) -> Result<Self> {
        client.database(name)
    }

    pub(crate) fn from_delegate(client: Client, delegate: sync::Database) -> Self {
        Self { client, delegate }
    }

    /// Gets the [`Client`] that this database was obtained from.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The wrapped blocking database handle.
    pub fn delegate(&self) -> &sync::Database {
        &self.delegate
    }

    /// Gets the name of the `Database`.
    pub fn name(&self) -> &str {
        self.delegate.name()
    }

    /// Gets the codec options of the `Database`.
    pub fn codec_options(&self) -> &CodecOptions {
        self.delegate.codec_options()
    }

    /// Gets the read preference of the `Database`.
    pub fn read_preference(&self) -> &ReadPreference {
        self.delegate.read_preference()
    }

    /// Gets the write concern of the `Database`.
    pub fn write_concern(&self) -> &WriteConcern {
        self.delegate.write_concern()
    }

    /// Gets a handle to a collection with type `T` specified by `name`. The `Collection` options
    /// (e.g. read preference and write concern) will default to those of the `Database`.
    ///
    /// This method does not send anything to the server; collections are created implicitly on
    /// first write, so any name is accepted here and checked by the server when used.
    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        self.get_collection(name, None)
    }

    /// Gets a handle to a collection with type `T` specified by `name`. Options set in `options`
    /// replace the `Database`'s; the rest are inherited.
    pub fn get_collection<T>(
        &self,
        name: &str,
        options: impl Into<Option<CollectionOptions>>,
    ) -> Collection<T> {
        Collection::from_delegate(self.clone(), self.delegate.get_collection(name, options))
    }

    /// Gets a new handle to this database, sharing its client, with the options set in `options`
    /// replacing this handle's.
    pub fn with_options(&self, options: DatabaseOptions) -> Database {
        Self::from_delegate(self.client.clone(), self.delegate.with_options(options))
    }

    /// Runs a database-level command and returns the server's reply. A reply reporting failure is
    /// returned as a [`Command`](crate::error::ErrorKind::Command) error.
    pub async fn command(&self, command: Document) -> Result<Document> {
        let delegate = self.delegate.clone();
        self.client
            .execute("command", move || delegate.run_command(command))
            .await
    }

    /// Runs a database-level aggregation, such as one starting with `$listLocalSessions`.
    ///
    /// The command is not sent until the returned cursor is first read.
    pub fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Cursor<Document> {
        let delegate = self.delegate.clone();
        let pipeline: Vec<Document> = pipeline.into_iter().collect();
        let options = options.into();
        Cursor::new(self.client.clone(), "aggregate", move || {
            delegate.aggregate(pipeline, options)
        })
    }

    /// Creates a new collection in the database with the given `name` and `options`.
    ///
    /// Fails with [`ErrorKind::CollectionInvalid`](crate::error::ErrorKind::CollectionInvalid)
    /// if the collection already exists.
    pub async fn create_collection(
        &self,
        name: &str,
        options: impl Into<Option<CreateCollectionOptions>>,
    ) -> Result<Collection<Document>> {
        let delegate = self.delegate.clone();
        let name = name.to_string();
        let options = options.into();
        let created = self
            .client
            .execute("create_collection", move || {
                delegate.create_collection(&name, options)
            })
            .await?;
        Ok(Collection::from_delegate(self.clone(), created))
    }

    /// Drops a collection, given its name or a handle to it. Dropping a collection that does
    /// not exist is not an error.
    pub async fn drop_collection(&self, target: impl Into<CollectionTarget>) -> Result<()> {
        let delegate = self.delegate.clone();
        let target = target.into();
        self.client
            .execute("drop_collection", move || delegate.drop_collection(target.name()))
            .await
    }

    /// Gets the names of the collections in the database, optionally restricted to those matching
    /// `filter`.
    pub async fn list_collection_names(
        &self,
        filter: impl Into<Option<Document>>,
    ) -> Result<Vec<String>> {
        let delegate = self.delegate.clone();
        let filter = filter.into();
        self.client
            .execute("list_collection_names", move || {
                delegate.list_collection_names(filter)
            })
            .await
    }

    /// Gets the specification of each collection in the database, optionally restricted to those
    /// matching `filter`.
    pub async fn list_collections(
        &self,
        filter: impl Into<Option<Document>>,
    ) -> Result<Vec<Document>> {
        let delegate = self.delegate.clone();
        let filter = filter.into();
        self.client
            .execute("list_collections", move || delegate.list_collections(filter))
            .await
    }

    /// Validates a collection, given its name or a handle to it, and returns the server's
    /// validation report.
    ///
    /// Fails with a command error if the collection does not exist, and with
    /// [`ErrorKind::CollectionInvalid`](crate::error::ErrorKind::CollectionInvalid) if the server
    /// reports it as invalid.
    pub async fn validate_collection(
        &self,
        target: impl Into<CollectionTarget>,
        options: impl Into<Option<ValidateOptions>>,
    ) -> Result<Document> {
        let delegate = self.delegate.clone();
        let target = target.into();
        let options = options.into();
        self.client
            .execute("validate_collection", move || {
                delegate.validate_collection(target.name(), options)
            })
            .await
    }

    /// Drops the database, deleting all of its collections.
    pub async fn drop(&self) -> Result<()> {
        let delegate = self.delegate.clone();
        self.client
            .execute("drop_database", move || delegate.drop())
            .await
    }

    /// Invokes the method called `method` with positional `args`.
    ///
    /// Collection arguments are given as names. A non-string collection argument fails with
    /// [`ErrorKind::InvalidType`](crate::error::ErrorKind::InvalidType); an unknown `method` fails
    /// with [`ErrorKind::NoSuchMethod`](crate::error::ErrorKind::NoSuchMethod).
    pub async fn call(&self, method: &str, args: Vec<Bson>) -> Result<Bson> {
        let mut args = args.into_iter();
        match method {
            "command" => match args.next() {
                Some(Bson::Document(command)) => Ok(Bson::Document(self.command(command).await?)),
                Some(Bson::String(name)) => {
                    let mut command = Document::new();
                    command.insert(name, 1);
                    Ok(Bson::Document(self.command(command).await?))
                }
                other => Err(Error::invalid_type(format!(
                    "command() argument 'command' must be a string or an object, not {}",
                    other.as_ref().map_or("nothing", crate::bson_util::type_name)
                ))),
            },
            "create_collection" => {
                let arg = args.next();
                let name = string_argument("create_collection", "name", arg.as_ref())?;
                self.create_collection(name, None).await?;
                Ok(Bson::Null)
            }
            "drop_collection" => {
                let target = CollectionTarget::try_from(args.next().unwrap_or(Bson::Null))?;
                self.drop_collection(target).await.map(|_| Bson::Null)
            }
            "list_collection_names" => {
                let filter = match args.next() {
                    None | Some(Bson::Null) => None,
                    Some(Bson::Document(filter)) => Some(filter),
                    Some(other) => {
                        return Err(Error::invalid_type(format!(
                            "list_collection_names() argument 'filter' must be an object, not {}",
                            crate::bson_util::type_name(&other)
                        )))
                    }
                };
                Ok(Bson::from(self.list_collection_names(filter).await?))
            }
            "validate_collection" => {
                let target = CollectionTarget::try_from(args.next().unwrap_or(Bson::Null))?;
                Ok(Bson::Document(self.validate_collection(target, None).await?))
            }
            _ => Err(Error::no_such_method("Database", method, DISPATCHABLE_METHODS)),
        }
    }
}

/// Identifies a collection in the database an operation runs on, either by name or by handle.
///
/// A handle is reduced to its collection name, so a handle obtained from another database names
/// the collection of the same name in this one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionTarget {
    name: String,
}

impl CollectionTarget {
    /// The name of the targeted collection.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl From<&str> for CollectionTarget {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl From<String> for CollectionTarget {
    fn from(name: String) -> Self {
        Self { name }
    }
}

impl<T> From<&Collection<T>> for CollectionTarget {
    fn from(collection: &Collection<T>) -> Self {
        collection.name().into()
    }
}

impl<T> From<&sync::Collection<T>> for CollectionTarget {
    fn from(collection: &sync::Collection<T>) -> Self {
        collection.name().into()
    }
}

impl TryFrom<Bson> for CollectionTarget {
    type Error = Error;

    fn try_from(value: Bson) -> Result<Self> {
        match value {
            Bson::String(name) => Ok(name.into()),
            other => Err(Error::invalid_type(format!(
                "name_or_collection must be a string or a Collection, not {}",
                crate::bson_util::type_name(&other)
            ))),
        }
    }
}
