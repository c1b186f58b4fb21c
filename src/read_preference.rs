//! Contains the read preference types.

use std::{collections::HashMap, time::Duration};

use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    error::{Error, Result},
    serde_util,
};

/// Specifies how the driver should route a read operation to members of a replica set.
///
/// If applicable, `tag_sets` can be used to target specific nodes in a replica set, and
/// `max_staleness` specifies the maximum lag behind the primary that a secondary can be to remain
/// eligible for the operation. The max staleness value maps to the `maxStalenessSeconds` MongoDB
/// option and will be sent to the server as an integer number of seconds.
///
/// Two read preferences are equal when they have the same mode and the same effective options;
/// `Secondary { options: None }` is equal to `Secondary` with default options.
///
/// See the [MongoDB docs](https://www.mongodb.com/docs/manual/core/read-preference) for more details.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    #[default]
    Primary,

    /// Only route this operation to a secondary.
    Secondary {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the primary if it's available, but fall back to the secondaries if
    /// not.
    PrimaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to a secondary if one is available, but fall back to the primary if
    /// not.
    SecondaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the node with the least network latency regardless of whether it's
    /// the primary or a secondary.
    Nearest {
        options: Option<ReadPreferenceOptions>,
    },
}

impl PartialEq for ReadPreference {
    fn eq(&self, other: &Self) -> bool {
        self.mode() == other.mode() && self.effective_options() == other.effective_options()
    }
}

impl<'de> Deserialize<'de> for ReadPreference {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct ReadPreferenceHelper {
            mode: String,
            #[serde(flatten)]
            options: ReadPreferenceOptions,
        }
        let helper = ReadPreferenceHelper::deserialize(deserializer)?;
        let read_pref = ReadPreference::from_mode(&helper.mode).map_err(D::Error::custom)?;
        if helper.options.is_default() {
            return Ok(read_pref);
        }
        read_pref
            .with_options(helper.options)
            .map_err(D::Error::custom)
    }
}

impl Serialize for ReadPreference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[serde_with::skip_serializing_none]
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ReadPreferenceHelper<'a> {
            mode: &'static str,
            #[serde(flatten)]
            options: Option<&'a ReadPreferenceOptions>,
        }

        let helper = ReadPreferenceHelper {
            mode: self.mode(),
            options: self.effective_options(),
        };
        helper.serialize(serializer)
    }
}

/// Specifies read preference options for non-primary read preferences.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Specifies which replica set members should be considered for operations. Each tag set will
    /// be checked in order until one or more servers is found with each tag in the set.
    #[serde(alias = "tag_sets")]
    pub tag_sets: Option<Vec<TagSet>>,

    /// Specifies the maximum amount of lag behind the primary that a secondary can be to be
    /// considered for the given operation. Any secondaries lagging behind more than
    /// `max_staleness` will not be considered for the operation.
    #[serde(
        rename = "maxStalenessSeconds",
        default,
        with = "serde_util::duration_option_as_int_seconds"
    )]
    pub max_staleness: Option<Duration>,
}

impl ReadPreferenceOptions {
    pub(crate) fn is_default(&self) -> bool {
        self.max_staleness.is_none()
            && self
                .tag_sets
                .as_ref()
                .map(|ts| ts.is_empty() || ts[..] == [HashMap::default()])
                .unwrap_or(true)
    }
}

impl ReadPreference {
    /// A `Secondary` read preference with no tag sets or max staleness.
    pub fn secondary() -> Self {
        Self::Secondary { options: None }
    }

    /// A `Secondary` read preference that only considers members matching `tag_sets`.
    pub fn secondary_with_tags(tag_sets: Vec<TagSet>) -> Self {
        Self::Secondary {
            options: Some(ReadPreferenceOptions::builder().tag_sets(tag_sets).build()),
        }
    }

    /// Parses a read preference mode name such as `"secondaryPreferred"`, ignoring case.
    pub(crate) fn from_mode(mode: &str) -> Result<Self> {
        Ok(match mode.to_ascii_lowercase().as_str() {
            "primary" => ReadPreference::Primary,
            "secondary" => ReadPreference::Secondary { options: None },
            "primarypreferred" => ReadPreference::PrimaryPreferred { options: None },
            "secondarypreferred" => ReadPreference::SecondaryPreferred { options: None },
            "nearest" => ReadPreference::Nearest { options: None },
            other => {
                return Err(Error::invalid_argument(format!(
                    "'{}' is not a valid read preference",
                    other
                )))
            }
        })
    }

    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary { .. } => "secondary",
            Self::PrimaryPreferred { .. } => "primaryPreferred",
            Self::SecondaryPreferred { .. } => "secondaryPreferred",
            Self::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            Self::Primary => None,
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => options.as_ref(),
        }
    }

    fn effective_options(&self) -> Option<&ReadPreferenceOptions> {
        self.options().filter(|options| !options.is_default())
    }

    /// Gets the tag sets of this read preference, if any.
    pub fn tag_sets(&self) -> Option<&Vec<TagSet>> {
        self.options().and_then(|options| options.tag_sets.as_ref())
    }

    /// Gets the max staleness of this read preference, if any.
    pub fn max_staleness(&self) -> Option<Duration> {
        self.options().and_then(|options| options.max_staleness)
    }

    fn options_mut(&mut self, what: &str) -> Result<&mut Option<ReadPreferenceOptions>> {
        match self {
            Self::Primary => Err(Error::invalid_argument(format!(
                "{} can only be specified when a non-primary mode is specified",
                what
            ))),
            Self::Secondary { ref mut options }
            | Self::PrimaryPreferred { ref mut options }
            | Self::SecondaryPreferred { ref mut options }
            | Self::Nearest { ref mut options } => Ok(options),
        }
    }

    pub(crate) fn with_options(mut self, new_options: ReadPreferenceOptions) -> Result<Self> {
        *self.options_mut("read preference options")? = Some(new_options);
        Ok(self)
    }

    pub(crate) fn with_tags(mut self, tag_sets: Vec<TagSet>) -> Result<Self> {
        self.options_mut("read preference tags")?
            .get_or_insert_with(Default::default)
            .tag_sets = Some(tag_sets);
        Ok(self)
    }

    pub(crate) fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        self.options_mut("max staleness")?
            .get_or_insert_with(Default::default)
            .max_staleness = Some(max_staleness);
        Ok(self)
    }

    /// The `$readPreference` field to attach to a read command, or `None` for primary reads.
    pub(crate) fn to_command_field(&self) -> Result<Option<Document>> {
        if matches!(self, Self::Primary) {
            return Ok(None);
        }
        serde_util::to_command_fields(self).map(Some)
    }
}

/// A read preference tag set. See the documentation [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/) for more details.
pub type TagSet = HashMap<String, String>;

#[cfg(test)]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{ReadPreference, ReadPreferenceOptions, TagSet};
    use crate::bson::{doc, from_document, to_document};

    fn sf_tags() -> Vec<TagSet> {
        vec![[("dc".to_string(), "sf".to_string())].into_iter().collect()]
    }

    #[test]
    fn empty_options_equal_no_options() {
        let with_empty = ReadPreference::Secondary {
            options: Some(ReadPreferenceOptions::default()),
        };
        assert_eq!(with_empty, ReadPreference::secondary());
        assert_ne!(ReadPreference::secondary(), ReadPreference::Primary);
        assert_ne!(
            ReadPreference::secondary_with_tags(sf_tags()),
            ReadPreference::secondary()
        );
    }

    #[test]
    fn tagged_read_preference_document() {
        let read_pref = ReadPreference::secondary_with_tags(sf_tags())
            .with_max_staleness(Duration::from_secs(120))
            .unwrap();

        assert_eq!(
            read_pref.to_command_field().unwrap(),
            Some(doc! {
                "mode": "secondary",
                "tagSets": [{ "dc": "sf" }],
                "maxStalenessSeconds": 120,
            })
        );
        assert_eq!(ReadPreference::Primary.to_command_field().unwrap(), None);
    }

    #[test]
    fn primary_rejects_tags() {
        assert!(ReadPreference::Primary.with_tags(sf_tags()).is_err());
        assert!(ReadPreference::from_mode("fastest").is_err());
        assert_eq!(
            ReadPreference::from_mode("SecondaryPreferred").unwrap(),
            ReadPreference::SecondaryPreferred { options: None }
        );
    }

    #[test]
    fn read_preference_from_document() {
        let read_pref = ReadPreference::secondary_with_tags(sf_tags());
        let document = to_document(&read_pref).unwrap();
        assert_eq!(document, doc! { "mode": "secondary", "tagSets": [{ "dc": "sf" }] });
        assert_eq!(from_document::<ReadPreference>(document).unwrap(), read_pref);

        let nearest: ReadPreference =
            from_document(doc! { "mode": "nearest", "maxStalenessSeconds": 90 }).unwrap();
        assert_eq!(nearest.max_staleness(), Some(Duration::from_secs(90)));

        let primary: ReadPreference = from_document(doc! { "mode": "primary" }).unwrap();
        assert_eq!(primary, ReadPreference::Primary);

        assert!(from_document::<ReadPreference>(doc! {
            "mode": "primary",
            "tagSets": [{ "dc": "sf" }],
        })
        .is_err());
        assert!(from_document::<ReadPreference>(doc! { "mode": "closest" }).is_err());
    }
}
