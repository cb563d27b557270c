use crate::types::{EnvName, TagName};
use crate::SchemaError;
use chrono::{DateTime, NaiveDate, Utc};

/// First field of every snapshot tag name.
pub const TAG_PREFIX: &str = "env";

/// Unsuffixed tag name for a manifest commit made on `date` (UTC).
pub fn snapshot_tag_base(env: &str, date: NaiveDate) -> String {
    format!("{TAG_PREFIX}-{env}-{}", date.format("%Y_%m_%d"))
}

/// Candidate `n` for a same-day snapshot: the base itself, then `-1`, `-2`, …
pub fn snapshot_tag_candidate(base: &str, n: u32) -> TagName {
    if n == 0 {
        TagName::new(base)
    } else {
        TagName::new(format!("{base}-{n}"))
    }
}

/// UTC calendar date of a commit timestamp given in seconds since the epoch.
pub fn commit_date(seconds: i64) -> Result<NaiveDate, SchemaError> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|dt| dt.date_naive())
        .ok_or(SchemaError::InvalidTimestamp(seconds))
}

/// The two fields a deployment needs from a tag name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    pub env: EnvName,
    /// Everything after the environment field; names the installed directory.
    pub deployed_name: String,
}

/// Split `env-<environment>-<deployed-name>`.
pub fn parse_tag(tag: &str) -> Result<ParsedTag, SchemaError> {
    let mut fields = tag.splitn(3, '-');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(_), Some(env), Some(deployed)) if !env.is_empty() && !deployed.is_empty() => {
            Ok(ParsedTag {
                env: EnvName::new(env),
                deployed_name: deployed.to_owned(),
            })
        }
        _ => Err(SchemaError::InvalidTagName(tag.to_owned())),
    }
}
