//! Newtype wrappers for the names that flow between branches, tags and labels.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a tracked environment. Doubles as the environment's branch name.
    EnvName
);

string_newtype!(
    /// Name of an immutable snapshot tag, `env-<environment>-<deployed-name>`.
    TagName
);

string_newtype!(
    /// Name of a mutable pointer such as `next`, `current`, `previous` or `latest`.
    LabelName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_name_display_and_as_ref() {
        let name = EnvName::new("default");
        assert_eq!(name.to_string(), "default");
        assert_eq!(name.as_str(), "default");
        assert_eq!(AsRef::<str>::as_ref(&name), "default");
    }

    #[test]
    fn tag_name_serializes_as_plain_string() {
        let tag = TagName::new("env-default-2024_01_31");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"env-default-2024_01_31\"");
        let back: TagName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn label_name_compares_with_str() {
        let label = LabelName::from("next");
        assert_eq!(label, "next");
        assert_ne!(label, "current");
    }

    #[test]
    fn names_order_lexicographically() {
        let a = TagName::new("env-x-2024_01_01");
        let b = TagName::new("env-x-2024_01_01-1");
        assert!(a < b);
    }
}
