//! Contains the options controlling how documents are decoded and encoded by a handle.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{Error, Result};

/// How UUID values are represented when stored as BSON binary.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum UuidRepresentation {
    /// No representation has been chosen; native UUIDs cannot be encoded.
    #[default]
    #[display("unspecified")]
    Unspecified,

    /// The standard RFC 4122 representation (binary subtype 4).
    #[display("standard")]
    Standard,

    /// The legacy byte order used by the Python driver (binary subtype 3).
    #[display("pythonLegacy")]
    PythonLegacy,

    /// The legacy byte order used by the Java driver (binary subtype 3).
    #[display("javaLegacy")]
    JavaLegacy,

    /// The legacy byte order used by the C# driver (binary subtype 3).
    #[display("csharpLegacy")]
    CSharpLegacy,
}

impl UuidRepresentation {
    pub(crate) fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "unspecified" => Self::Unspecified,
            "standard" => Self::Standard,
            "pythonlegacy" => Self::PythonLegacy,
            "javalegacy" => Self::JavaLegacy,
            "csharplegacy" => Self::CSharpLegacy,
            other => {
                return Err(Error::invalid_argument(format!(
                    "'{}' is not a valid uuid representation",
                    other
                )))
            }
        })
    }
}

/// The serialization settings a handle applies to the documents it reads and writes.
///
/// `CodecOptions` is a plain value: two bundles with the same settings are equal, and handles
/// hold their own copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CodecOptions {
    /// Whether decoded datetimes carry a time zone.
    #[builder(default)]
    pub tz_aware: bool,

    /// How UUID values are represented in BSON.
    #[builder(default)]
    pub uuid_representation: UuidRepresentation,

    /// The handler used when a string in a document is not valid UTF-8.
    #[builder(default = "strict".to_string())]
    pub unicode_decode_error_handler: String,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
