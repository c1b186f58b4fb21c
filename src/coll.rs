pub mod options;

use std::{borrow::Borrow, fmt};

use derive_where::derive_where;
use serde::{de::DeserializeOwned, Serialize};

use self::options::{AggregateOptions, FindOneOptions, FindOptions, InsertManyOptions};
use crate::{
    bson::Document,
    codec::CodecOptions,
    concern::WriteConcern,
    error::{Error, Result},
    read_preference::ReadPreference,
    results::{DeleteResult, InsertManyResult, InsertOneResult},
    sync,
    Client,
    Cursor,
    Database,
};

/// `Collection` is the client-side abstraction of a MongoDB collection. It can be used to
/// perform collection-level operations such as CRUD operations. A `Collection` can be obtained
/// through a [`Database`](struct.Database.html) by calling either
/// [`Database::collection`](struct.Database.html#method.collection) or
/// [`Database::get_collection`](struct.Database.html#method.get_collection).
///
/// A [`Collection`] can be parameterized with any type that implements the `Serialize` and
/// `Deserialize` traits from the [`serde`](https://serde.rs/) crate. This includes but is not
/// limited to just `Document`. Documents are serialized before a blocking call is dispatched and
/// deserialized after it completes, so `T` itself never crosses to the worker pool.
///
/// `Collection` is cheap to clone and can be shared across tasks.
///
/// # Example
/// ```rust
/// # use mongodb_motor::{bson::doc, error::Result, Client};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Deserialize, Serialize)]
/// struct Item {
///     id: u32,
/// }
///
/// # async fn run() -> Result<()> {
/// let client = Client::in_memory();
/// let coll = client.database("items")?.collection::<Item>("in_stock");
/// coll.insert_one(Item { id: 1 }).await?;
/// let item = coll.find_one(doc! { "id": 1 }, None).await?;
/// # Ok(())
/// # }
/// ```
#[derive_where(Clone, Debug)]
pub struct Collection<T> {
    database: Database,
    delegate: sync::Collection<T>,
}

impl<T> Collection<T> {
    pub(crate) fn from_delegate(database: Database, delegate: sync::Collection<T>) -> Self {
        Self { database, delegate }
    }

    /// Gets a clone of the `Collection` with a different type `U`.
    pub fn clone_with_type<U>(&self) -> Collection<U> {
        Collection {
            database: self.database.clone(),
            delegate: self.delegate.clone_with_type(),
        }
    }

    /// Gets the `Client` that this collection descended from.
    pub fn client(&self) -> &Client {
        self.database.client()
    }

    /// Gets the `Database` that this collection belongs to.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The wrapped blocking collection handle.
    pub fn delegate(&self) -> &sync::Collection<T> {
        &self.delegate
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        self.delegate.name()
    }

    /// Gets the namespace of the `Collection`.
    ///
    /// The namespace of a MongoDB collection is the concatenation of the name of the database
    /// containing it, the '.' character, and the name of the collection itself. For example, if a
    /// collection named "bar" is created in a database named "foo", the namespace of the collection
    /// is "foo.bar".
    pub fn namespace(&self) -> Namespace {
        self.delegate.namespace()
    }

    /// Gets the codec options of the `Collection`.
    pub fn codec_options(&self) -> &CodecOptions {
        self.delegate.codec_options()
    }

    /// Gets the read preference of the `Collection`.
    pub fn read_preference(&self) -> &ReadPreference {
        self.delegate.read_preference()
    }

    /// Gets the write concern of the `Collection`.
    pub fn write_concern(&self) -> &WriteConcern {
        self.delegate.write_concern()
    }

    fn documents(&self) -> sync::Collection<Document> {
        self.delegate.clone_with_type()
    }

    /// Drops the collection, deleting all data and indexes stored in it.
    pub async fn drop(&self) -> Result<()> {
        let delegate = self.documents();
        self.client()
            .execute("drop_collection", move || delegate.drop())
            .await
    }

    /// Deletes up to one document found matching `query`.
    pub async fn delete_one(&self, query: Document) -> Result<DeleteResult> {
        let delegate = self.documents();
        self.client()
            .execute("delete_one", move || delegate.delete_one(query))
            .await
    }

    /// Deletes all documents stored in the collection matching `query`.
    pub async fn delete_many(&self, query: Document) -> Result<DeleteResult> {
        let delegate = self.documents();
        self.client()
            .execute("delete_many", move || delegate.delete_many(query))
            .await
    }

    /// Gets the number of documents matching `filter`.
    pub async fn count_documents(&self, filter: impl Into<Option<Document>>) -> Result<u64> {
        let delegate = self.documents();
        let filter = filter.into();
        self.client()
            .execute("count_documents", move || delegate.count_documents(filter))
            .await
    }

    /// Runs an aggregation operation over the collection.
    ///
    /// The command is not sent until the returned cursor is first read.
    pub fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Cursor<Document> {
        let delegate = self.documents();
        let pipeline: Vec<Document> = pipeline.into_iter().collect();
        let options = options.into();
        Cursor::new(self.client().clone(), "aggregate", move || {
            delegate.aggregate(pipeline, options)
        })
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned,
{
    /// Finds the documents in the collection matching `filter`.
    ///
    /// The query is not sent until the returned cursor is first read.
    pub fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Cursor<T> {
        let delegate = self.documents();
        let filter = filter.into();
        let options = options.into();
        Cursor::new(self.client().clone(), "find", move || {
            delegate.find(filter, options)
        })
    }

    /// Finds a single document in the collection matching `filter`.
    pub async fn find_one(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<T>> {
        let delegate = self.documents();
        let filter = filter.into();
        let options = options.into();
        let found = self
            .client()
            .execute("find_one", move || delegate.find_one(filter, options))
            .await?;

        found
            .map(|doc| crate::bson::from_document(doc).map_err(Error::from))
            .transpose()
    }
}

impl<T> Collection<T>
where
    T: Serialize,
{
    /// Inserts `doc` into the collection. If the document has no `_id`, one is generated.
    ///
    /// Note that either an owned or borrowed value can be inserted here, so the input document
    /// does not need to be cloned to be passed in.
    pub async fn insert_one(&self, doc: impl Borrow<T>) -> Result<InsertOneResult> {
        let doc = crate::bson::to_document(doc.borrow())?;
        let delegate = self.documents();
        self.client()
            .execute("insert_one", move || delegate.insert_one(doc))
            .await
    }

    /// Inserts the documents in `docs` into the collection, generating an `_id` for each
    /// document that lacks one.
    ///
    /// Note that either owned or borrowed values can be inserted here, so the input documents
    /// do not need to be cloned to be passed in.
    pub async fn insert_many(
        &self,
        docs: impl IntoIterator<Item = impl Borrow<T>>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<InsertManyResult> {
        let docs = docs
            .into_iter()
            .map(|doc| crate::bson::to_document(doc.borrow()).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        let options = options.into();
        let delegate = self.documents();
        self.client()
            .execute("insert_many", move || delegate.insert_many(docs, options))
            .await
    }
}

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl Namespace {
    /// Construct a `Namespace` with the given database and collection.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}
