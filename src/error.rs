//! Contains the `Error` and `Result` types that `mongodb_motor` uses.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::bson::{Bson, Document};

const NAMESPACE_NOT_FOUND: i32 = 26;
const NAMESPACE_EXISTS: i32 = 48;

/// The similarity above which an unknown name is reported together with its closest match.
const SIMILAR_NAME_THRESHOLD: f64 = 0.84;

/// The result type for all methods that can return an error in the `mongodb_motor` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `mongodb_motor` crate. The inner [`ErrorKind`] is boxed to
/// keep `Result`s small.
#[derive(Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_type(message: impl Into<String>) -> Self {
        ErrorKind::InvalidType {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    /// Creates the error returned when `method` is invoked by name on a `type_name` handle that
    /// has no such method. If one of `candidates` is close enough to `method`, it is suggested.
    pub(crate) fn no_such_method(type_name: &str, method: &str, candidates: &[&str]) -> Self {
        let (score, closest) = candidates.iter().fold((0.0, ""), |acc, candidate| {
            let score = strsim::jaro_winkler(candidate, method).abs();
            if score > acc.0 {
                return (score, candidate);
            }
            acc
        });

        let mut message = format!(
            "'{}' is not a method of {}: if you meant to call the '{}' method on a {} it is \
             failing because no such method exists",
            method, type_name, method, type_name
        );
        if score >= SIMILAR_NAME_THRESHOLD {
            message.push_str(&format!(". A method with a similar name exists: {}", closest));
        }
        ErrorKind::NoSuchMethod { message }.into()
    }

    /// Whether this error is an "ns not found" error or not.
    pub(crate) fn is_ns_not_found(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(err) if err.code == NAMESPACE_NOT_FOUND)
    }

    /// Whether this error is a "namespace exists" error or not.
    pub(crate) fn is_ns_exists(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(err) if err.code == NAMESPACE_EXISTS)
    }

    /// The server error code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(err) => Some(err.code),
            ErrorKind::Write(WriteFailure::WriteError(err)) => Some(err.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(err)) => Some(err.code),
            _ => None,
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self {
            kind: Box::new(err.into()),
        }
    }
}

impl std::ops::Deref for Error {
    type Target = ErrorKind;

    fn deref(&self) -> &Self::Target {
        &self.kind
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// A value of the wrong type was provided where a specific type is required.
    #[error("{message}")]
    #[non_exhaustive]
    InvalidType { message: String },

    /// A collection could not be created because it already exists, or failed validation.
    #[error("{message}")]
    #[non_exhaustive]
    CollectionInvalid { message: String },

    /// The server returned an error to an attempted command.
    #[error("Command failed: {0}")]
    Command(CommandError),

    /// An error occurred when trying to execute a write operation.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    Write(WriteFailure),

    /// The server returned an invalid reply to a database operation.
    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// A method was invoked by name that the target handle does not have.
    #[error("{message}")]
    #[non_exhaustive]
    NoSuchMethod { message: String },

    /// The client was closed before the operation could be dispatched.
    #[error("Client has been closed; no further operations may be started")]
    Shutdown,

    /// Wrapper around `bson::ser::Error`.
    #[error("{0}")]
    BsonSerialization(#[from] crate::bson::ser::Error),

    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(#[from] crate::bson::de::Error),

    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Error code {} ({}): {}", self.code, self.code_name, self.message)
    }
}

/// An error that occurred due to not being able to satisfy a write concern.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,

    /// A document identifying the write concern setting related to the error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// An error that occurred during a write operation that wasn't due to being unable to satisfy a
/// write concern.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteError {
    /// Index into the list of documents of the write that failed.
    #[serde(default)]
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// The name associated with the error code.
    ///
    /// Note that the server will not return this in some cases, hence `code_name` being an
    /// `Option`.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default)]
    pub message: String,
}

/// An error that occurred when trying to execute a write operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum WriteFailure {
    /// An error that occurred due to not being able to satisfy a write concern.
    WriteConcernError(WriteConcernError),

    /// An error that occurred during a write operation that wasn't due to being unable to satisfy a
    /// write concern.
    WriteError(WriteError),
}

impl WriteFailure {
    /// Extracts the first write error or the write concern error from a write command reply.
    pub(crate) fn from_reply(reply: &Document) -> Result<Option<Self>> {
        if let Ok(errors) = reply.get_array("writeErrors") {
            if let Some(Bson::Document(first)) = errors.first() {
                let error: WriteError = crate::bson::from_document(first.clone())?;
                return Ok(Some(WriteFailure::WriteError(error)));
            }
        }

        if let Ok(wc_error) = reply.get_document("writeConcernError") {
            let error: WriteConcernError = crate::bson::from_document(wc_error.clone())?;
            return Ok(Some(WriteFailure::WriteConcernError(error)));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::{Error, ErrorKind};

    #[test]
    fn unknown_method_message() {
        let error = Error::no_such_method("Client", "foo", &["server_info", "drop_database"]);
        let message = error.to_string();
        assert!(message.contains("no such method exists"));
        assert!(!message.contains("similar name"));
        assert!(matches!(*error.kind, ErrorKind::NoSuchMethod { .. }));
    }

    #[test]
    fn unknown_method_suggests_close_match() {
        let error = Error::no_such_method("Client", "server_infos", &["server_info"]);
        assert!(error
            .to_string()
            .ends_with("A method with a similar name exists: server_info"));
    }
}
