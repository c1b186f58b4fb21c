#[cfg(test)]
mod test;

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use typed_builder::TypedBuilder;

use crate::{
    codec::{CodecOptions, UuidRepresentation},
    concern::{Acknowledgment, WriteConcern},
    error::{Error, Result},
    read_preference::{ReadPreference, TagSet},
};

pub(crate) const DEFAULT_PORT: u16 = 27017;

const URI_OPTIONS: &[&str] = &[
    "appname",
    "journal",
    "maxstalenessseconds",
    "maxworkers",
    "readpreference",
    "readpreferencetags",
    "tz_aware",
    "uuidrepresentation",
    "w",
    "wtimeoutms",
];

const ILLEGAL_DATABASE_CHARACTERS: &[char] = &['/', '\\', ' ', '"', '$', '.', '\0'];

/// Checks that `name` can be used as a database name.
pub(crate) fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("database name cannot be empty"));
    }
    if let Some(c) = name.chars().find(|c| ILLEGAL_DATABASE_CHARACTERS.contains(c)) {
        return Err(Error::invalid_argument(format!(
            "database names cannot contain the character {:?}",
            c
        )));
    }
    Ok(())
}

/// The address of a MongoDB server.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ServerAddress {
    /// The hostname or IP address where the MongoDB server can be found.
    pub host: String,

    /// The TCP port that the MongoDB server is listening on.
    ///
    /// The default is 27017.
    pub port: Option<u16>,
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let (hostname, port) = match address.rfind(':') {
            Some(index) => (&address[..index], Some(&address[index + 1..])),
            None => (address, None),
        };

        if hostname.is_empty() {
            return Err(Error::invalid_argument(format!(
                "invalid server address: \"{}\"; hostname cannot be empty",
                address
            )));
        }

        let port = match port {
            Some(port) => match port.parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(Error::invalid_argument(format!(
                        "invalid port specified in connection string: {}",
                        port
                    )))
                }
                Ok(p) => Some(p),
            },
            None => None,
        };

        Ok(ServerAddress {
            host: hostname.to_lowercase(),
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port.unwrap_or(DEFAULT_PORT))
    }
}

/// Contains the options that can be used to create a new [`Client`](../struct.Client.html).
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ClientOptions {
    /// The initial list of seeds that the Client should connect to.
    ///
    /// The hosts are recorded for the [`Connection`](crate::sync::Connection) implementation in
    /// use; the facade itself does not open sockets.
    #[builder(default = vec![ServerAddress::default()])]
    pub hosts: Vec<ServerAddress>,

    /// The application name that the Client will send to the server as part of the handshake.
    pub app_name: Option<String>,

    /// The database named in the path of the connection string, if any.
    pub default_database: Option<String>,

    /// The default codec options for databases and collections obtained from the client.
    pub codec_options: Option<CodecOptions>,

    /// The default read preference for operations.
    pub read_preference: Option<ReadPreference>,

    /// The default write concern for operations.
    pub write_concern: Option<WriteConcern>,

    /// The maximum number of blocking driver calls that may run at once.
    ///
    /// The default is `min(32, available_parallelism + 4)`, or the value of the
    /// `MONGODB_MOTOR_MAX_WORKERS` environment variable when set.
    pub max_workers: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientOptions {
    /// Parses a MongoDB connection string into a `ClientOptions` struct.
    ///
    /// The format of a MongoDB connection string is described [here](https://www.mongodb.com/docs/manual/reference/connection-string/#connection-string-formats).
    ///
    /// The following options are supported in the options query string:
    ///
    ///   * `appName`: maps to the `app_name` field
    ///   * `journal`: maps to the `journal` field of the `write_concern` field
    ///   * `maxStalenessSeconds`: maps to the `max_staleness` field of the `read_preference` field
    ///   * `maxWorkers`: maps to the `max_workers` field
    ///   * `readPreference`: maps to the `read_preference` field
    ///   * `readPreferenceTags`: maps to the `tag_sets` field of the `read_preference` field
    ///   * `tz_aware`: maps to the `tz_aware` field of the `codec_options` field
    ///   * `uuidRepresentation`: maps to the `uuid_representation` field of the `codec_options`
    ///     field
    ///   * `w`: maps to the `w` field of the `write_concern` field
    ///   * `wTimeoutMS`: maps to the `w_timeout` field of the `write_concern` field
    pub fn parse(s: impl AsRef<str>) -> Result<Self> {
        ClientOptionsParser::parse(s.as_ref()).map(Into::into)
    }
}

#[derive(Debug, Default)]
struct ClientOptionsParser {
    hosts: Vec<ServerAddress>,
    app_name: Option<String>,
    default_database: Option<String>,
    codec_options: Option<CodecOptions>,
    read_preference: Option<ReadPreference>,
    read_preference_tags: Option<Vec<TagSet>>,
    max_staleness: Option<Duration>,
    write_concern: Option<WriteConcern>,
    max_workers: Option<usize>,
}

impl From<ClientOptionsParser> for ClientOptions {
    fn from(parser: ClientOptionsParser) -> Self {
        Self {
            hosts: parser.hosts,
            app_name: parser.app_name,
            default_database: parser.default_database,
            codec_options: parser.codec_options,
            read_preference: parser.read_preference,
            write_concern: parser.write_concern,
            max_workers: parser.max_workers,
        }
    }
}

fn exclusive_split_at(s: &str, i: usize) -> (Option<&str>, Option<&str>) {
    let (l, r) = s.split_at(i);

    let lout = if !l.is_empty() { Some(l) } else { None };
    let rout = if r.len() > 1 { Some(&r[1..]) } else { None };

    (lout, rout)
}

fn percent_decode(s: &str, err_message: &str) -> Result<String> {
    match percent_encoding::percent_decode_str(s).decode_utf8() {
        Ok(result) => Ok(result.to_string()),
        Err(_) => Err(Error::invalid_argument(err_message)),
    }
}

impl ClientOptionsParser {
    fn parse(s: &str) -> Result<Self> {
        let end_of_scheme = match s.find("://") {
            Some(index) => index,
            None => {
                return Err(Error::invalid_argument(
                    "connection string contains no scheme",
                ))
            }
        };

        if &s[..end_of_scheme] != "mongodb" {
            return Err(Error::invalid_argument(format!(
                "invalid connection string scheme: {}",
                &s[..end_of_scheme]
            )));
        }

        let after_scheme = &s[end_of_scheme + 3..];

        let (pre_slash, post_slash) = match after_scheme.find('/') {
            Some(slash_index) => match exclusive_split_at(after_scheme, slash_index) {
                (Some(section), o) => (section, o),
                (None, _) => return Err(Error::invalid_argument("missing hosts")),
            },
            None => {
                if after_scheme.find('?').is_some() {
                    return Err(Error::invalid_argument(
                        "Missing delimiting slash between hosts and options",
                    ));
                }
                (after_scheme, None)
            }
        };

        let (database, options_section) = match post_slash {
            Some(section) => match section.find('?') {
                Some(index) => exclusive_split_at(section, index),
                None => (post_slash, None),
            },
            None => (None, None),
        };

        let default_database = match database {
            Some(db) => {
                let decoded = percent_decode(db, "database name must be URL encoded")?;
                validate_database_name(&decoded)?;
                Some(decoded)
            }
            None => None,
        };

        // Credentials are handled by the connection, so they are accepted and skipped here.
        let hosts_section = match pre_slash.rfind('@') {
            Some(index) => match exclusive_split_at(pre_slash, index) {
                (_, Some(hosts)) => hosts,
                (_, None) => return Err(Error::invalid_argument("missing hosts")),
            },
            None => pre_slash,
        };

        let hosts = hosts_section
            .split(',')
            .map(ServerAddress::parse)
            .collect::<Result<Vec<_>>>()?;

        let mut options = ClientOptionsParser {
            hosts,
            default_database,
            ..Default::default()
        };

        if let Some(opts) = options_section {
            options.parse_options(opts)?;
        }

        Ok(options)
    }

    fn parse_options(&mut self, options: &str) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }

        let mut keys: Vec<String> = Vec::new();

        for option_pair in options.split('&') {
            let (key, value) = match option_pair.find('=') {
                Some(index) => option_pair.split_at(index),
                None => {
                    return Err(Error::invalid_argument(format!(
                        "connection string options is not a `key=value` pair: {}",
                        option_pair,
                    )))
                }
            };

            // Option names are case-insensitive.
            let key = key.to_lowercase();
            if key != "readpreferencetags" && keys.contains(&key) {
                return Err(Error::invalid_argument(
                    "repeated options are not allowed in the connection string",
                ));
            }

            // Skip leading '=' in value.
            self.parse_option_pair(
                &key,
                percent_encoding::percent_decode(&value.as_bytes()[1..])
                    .decode_utf8_lossy()
                    .as_ref(),
            )?;
            keys.push(key);
        }

        if let Some(tags) = self.read_preference_tags.take() {
            self.read_preference = match self.read_preference.take() {
                Some(read_pref) => Some(read_pref.with_tags(tags)?),
                None => {
                    return Err(Error::invalid_argument(
                        "cannot set read preference tags without also setting read preference \
                         mode",
                    ))
                }
            };
        }

        if let Some(max_staleness) = self.max_staleness.take() {
            self.read_preference = match self.read_preference.take() {
                Some(read_pref) => Some(read_pref.with_max_staleness(max_staleness)?),
                None => {
                    return Err(Error::invalid_argument(
                        "cannot set max staleness without also setting read preference mode",
                    ))
                }
            };
        }

        Ok(())
    }

    fn parse_option_pair(&mut self, key: &str, value: &str) -> Result<()> {
        macro_rules! get_bool {
            ($value:expr, $option:expr) => {
                match $value {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "connection string `{}` option must be a boolean",
                            $option,
                        )))
                    }
                }
            };
        }

        macro_rules! get_duration {
            ($value:expr, $option:expr) => {
                match $value.parse::<u64>() {
                    Ok(i) => i,
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "connection string `{}` option must be a non-negative integer",
                            $option
                        )))
                    }
                }
            };
        }

        match key {
            "appname" => {
                self.app_name = Some(value.into());
            }
            k @ "journal" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);
                write_concern.journal = Some(get_bool!(value, k));
            }
            k @ "maxstalenessseconds" => {
                let max_staleness = Duration::from_secs(get_duration!(value, k));

                if max_staleness > Duration::from_secs(0) && max_staleness < Duration::from_secs(90)
                {
                    return Err(Error::invalid_argument(
                        "'maxStalenessSeconds' cannot be both positive and below 90",
                    ));
                }

                self.max_staleness = Some(max_staleness);
            }
            k @ "maxworkers" => match value.parse::<usize>() {
                Ok(n) if n > 0 => self.max_workers = Some(n),
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "connection string `{}` argument must be a positive integer",
                        k
                    )))
                }
            },
            "readpreference" => {
                self.read_preference = Some(ReadPreference::from_mode(value)?);
            }
            "readpreferencetags" => {
                let tags: Result<TagSet> = if value.is_empty() {
                    Ok(TagSet::new())
                } else {
                    value
                        .split(',')
                        .map(|tag| {
                            let mut values = tag.split(':');

                            match (values.next(), values.next(), values.next()) {
                                (Some(key), Some(value), None) => {
                                    Ok((key.to_string(), value.to_string()))
                                }
                                _ => Err(Error::invalid_argument(format!(
                                    "'{}' is not a valid read preference tag (which must be of \
                                     the form 'key:value')",
                                    tag,
                                ))),
                            }
                        })
                        .collect()
                };

                self.read_preference_tags
                    .get_or_insert_with(Vec::new)
                    .push(tags?);
            }
            k @ "tz_aware" => {
                let codec_options = self.codec_options.get_or_insert_with(Default::default);
                codec_options.tz_aware = get_bool!(value, k);
            }
            "uuidrepresentation" => {
                let codec_options = self.codec_options.get_or_insert_with(Default::default);
                codec_options.uuid_representation = UuidRepresentation::from_str(value)?;
            }
            "w" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);

                match value.parse::<i32>() {
                    Ok(w) => {
                        if w < 0 {
                            return Err(Error::invalid_argument(
                                "connection string `w` option cannot be a negative integer",
                            ));
                        }

                        write_concern.w = Some(Acknowledgment::from(w as u32));
                    }
                    Err(_) => {
                        write_concern.w = Some(Acknowledgment::from(value.to_string()));
                    }
                };
            }
            k @ "wtimeoutms" => {
                let write_concern = self.write_concern.get_or_insert_with(Default::default);
                write_concern.w_timeout = Some(Duration::from_millis(get_duration!(value, k)));
            }

            other => {
                let (jaro_winkler, option) = URI_OPTIONS.iter().fold((0.0, ""), |acc, option| {
                    let jaro_winkler = jaro_winkler(option, other).abs();
                    if jaro_winkler > acc.0 {
                        return (jaro_winkler, option);
                    }
                    acc
                });
                let mut message = format!("{} is an invalid option", other);
                if jaro_winkler >= 0.84 {
                    message.push_str(&format!(
                        ". An option with a similar name exists: {}",
                        option
                    ));
                }
                return Err(Error::invalid_argument(message));
            }
        }

        if let Some(write_concern) = self.write_concern.as_ref() {
            write_concern.validate()?;
        }

        Ok(())
    }
}
