use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Instant,
};

use super::{Connection, Database};
use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document},
    bson_util,
    client::options::ClientOptions,
    codec::CodecOptions,
    concern::WriteConcern,
    db::options::DatabaseOptions,
    error::{CommandError, Error, ErrorKind, Result, WriteFailure},
    read_preference::ReadPreference,
    trace::{
        serialize_command_or_reply,
        TracingRepresentation,
        COMMAND_TRACING_EVENT_TARGET,
        DEFAULT_MAX_DOCUMENT_LENGTH_BYTES,
    },
};

/// The blocking client. Every method runs to completion on the calling thread.
///
/// `Client` uses [`std::sync::Arc`] internally, so it can safely be shared across threads and
/// cloned cheaply. All handles derived from it share its [`Connection`].
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    connection: Arc<dyn Connection>,
    options: ClientOptions,
    codec_options: CodecOptions,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
    session_id: Document,
    next_request_id: AtomicI32,
}

impl Client {
    /// Creates a new `Client` that runs commands over `connection`.
    pub fn with_options(connection: impl Connection, options: ClientOptions) -> Self {
        Self::with_shared_connection(Arc::new(connection), options)
    }

    /// Creates a new `Client` that shares an already-shared `connection`.
    pub fn with_shared_connection(connection: Arc<dyn Connection>, options: ClientOptions) -> Self {
        let session_id = doc! {
            "id": Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid::Uuid::new_v4().as_bytes().to_vec(),
            }
        };

        Self {
            inner: Arc::new(ClientInner {
                connection,
                codec_options: options.codec_options.clone().unwrap_or_default(),
                read_preference: options.read_preference.clone().unwrap_or_default(),
                write_concern: options.write_concern.clone().unwrap_or_default(),
                options,
                session_id,
                next_request_id: AtomicI32::new(1),
            }),
        }
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Gets the default codec options for handles derived from this client.
    pub fn codec_options(&self) -> &CodecOptions {
        &self.inner.codec_options
    }

    /// Gets the default read preference for handles derived from this client.
    pub fn read_preference(&self) -> &ReadPreference {
        &self.inner.read_preference
    }

    /// Gets the default write concern for handles derived from this client.
    pub fn write_concern(&self) -> &WriteConcern {
        &self.inner.write_concern
    }

    /// The id of the implicit session attached to every command this client sends.
    pub fn session_id(&self) -> &Document {
        &self.inner.session_id
    }

    /// Gets a handle to the database specified by `name`, with options inherited from this
    /// client. Fails if `name` is not a valid database name.
    pub fn database(&self, name: &str) -> Result<Database> {
        Database::new(self.clone(), name, None)
    }

    /// Gets a handle to the database specified by `name`, with the given options layered over
    /// this client's.
    pub fn database_with_options(&self, name: &str, options: DatabaseOptions) -> Result<Database> {
        Database::new(self.clone(), name, Some(options))
    }

    /// Gets a handle to the database named in the connection string, if one was.
    pub fn default_database(&self) -> Option<Result<Database>> {
        self.inner
            .options
            .default_database
            .as_deref()
            .map(|name| self.database(name))
    }

    /// Gets the names of all databases in the deployment.
    pub fn list_database_names(&self) -> Result<Vec<String>> {
        let reply = self.execute_command("admin", doc! { "listDatabases": 1, "nameOnly": true })?;
        let databases = reply
            .get_array("databases")
            .map_err(|_| Error::invalid_response("listDatabases reply is missing `databases`"))?;

        databases
            .iter()
            .map(|database| match database {
                Bson::Document(database) => database
                    .get_str("name")
                    .map(String::from)
                    .map_err(|_| Error::invalid_response("database entry is missing `name`")),
                _ => Err(Error::invalid_response(
                    "listDatabases returned a non-document entry",
                )),
            })
            .collect()
    }

    /// Drops the database `name`, deleting all of its collections.
    pub fn drop_database(&self, name: &str) -> Result<()> {
        self.database(name)?.drop()
    }

    /// Gets the deployment's build information.
    pub fn server_info(&self) -> Result<Document> {
        self.execute_command("admin", doc! { "buildinfo": 1 })
    }

    /// Sends `command` to `db` with this client's implicit session attached and turns a failed
    /// reply into an error.
    pub(crate) fn execute_command(&self, db: &str, mut command: Document) -> Result<Document> {
        let command_name = bson_util::first_key(&command)
            .unwrap_or_default()
            .to_string();
        command.insert("lsid", self.inner.session_id.clone());
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            command = serialize_command_or_reply(&command, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES),
            databaseName = db,
            commandName = command_name.as_str(),
            requestId = request_id,
            "Command started"
        );

        let start = Instant::now();
        let result = self
            .inner
            .connection
            .send_command(db, command)
            .and_then(check_reply);
        let duration = start.elapsed();

        match result {
            Ok(ref reply) => tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                reply = serialize_command_or_reply(reply, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES),
                commandName = command_name.as_str(),
                requestId = request_id,
                durationMS = duration.as_millis(),
                "Command succeeded"
            ),
            Err(ref error) => tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                failure = error.tracing_representation(),
                commandName = command_name.as_str(),
                requestId = request_id,
                durationMS = duration.as_millis(),
                "Command failed"
            ),
        }

        result
    }
}

fn check_reply(reply: Document) -> Result<Document> {
    if !bson_util::is_ok(&reply) {
        let error: CommandError = crate::bson::from_document(reply.clone()).map_err(|_| {
            Error::invalid_response(format!(
                "command failed without an error code: {}",
                reply.tracing_representation()
            ))
        })?;
        return Err(ErrorKind::Command(error).into());
    }

    if let Some(failure) = WriteFailure::from_reply(&reply)? {
        return Err(ErrorKind::Write(failure).into());
    }

    Ok(reply)
}
