use crate::types::EnvName;
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Path of the declared environment requirements, relative to a tree root.
pub const SPEC_FILE: &str = "env.spec";

/// Declared, human-authored requirements of one environment.
///
/// The on-disk form is YAML:
///
/// ```yaml
/// env:
///  - python 3.*
///  - numpy
/// channels:
///  - https://conda.anaconda.org/conda-forge
/// ```
///
/// Both lists keep their declared order; channel order is priority order.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnvSpec {
    #[serde(default, rename = "env")]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
}

pub fn parse_spec_str(input: &str) -> Result<EnvSpec, SchemaError> {
    if input.trim().is_empty() {
        return Ok(EnvSpec::default());
    }
    Ok(serde_yaml::from_str(input)?)
}

pub fn parse_spec_bytes(input: &[u8]) -> Result<EnvSpec, SchemaError> {
    let text = std::str::from_utf8(input).map_err(|_| SchemaError::NotUtf8(SPEC_FILE))?;
    parse_spec_str(text)
}

/// Check that a branch name can be tracked as an environment.
///
/// The `-` character separates fields of snapshot tag names, so an
/// environment name containing one could never be recovered from its tags.
pub fn validate_env_name(name: &str) -> Result<EnvName, SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::InvalidEnvName {
            name: name.to_owned(),
            reason: "environment name must not be empty",
        });
    }
    if name.contains('-') {
        return Err(SchemaError::InvalidEnvName {
            name: name.to_owned(),
            reason: "environment name must not contain '-'",
        });
    }
    Ok(EnvName::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requirements_and_channels_in_order() {
        let spec = parse_spec_str(
            r"
env:
 - python 2.*
 - numpy
channels:
 - https://example.com/first
 - defaults
",
        )
        .unwrap();
        assert_eq!(spec.requirements, vec!["python 2.*", "numpy"]);
        assert_eq!(spec.channels, vec!["https://example.com/first", "defaults"]);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let spec = parse_spec_str("env:\n - python\n").unwrap();
        assert_eq!(spec.requirements, vec!["python"]);
        assert!(spec.channels.is_empty());

        let spec = parse_spec_str("channels: []\n").unwrap();
        assert!(spec.requirements.is_empty());
    }

    #[test]
    fn empty_document_is_empty_spec() {
        assert_eq!(parse_spec_str("  \n").unwrap(), EnvSpec::default());
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(parse_spec_str("env: [python\n").is_err());
    }

    #[test]
    fn rejects_non_utf8() {
        let err = parse_spec_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(err.to_string().contains(SPEC_FILE));
    }

    #[test]
    fn env_names_without_dash_are_valid() {
        assert_eq!(validate_env_name("bleeding_edge").unwrap(), "bleeding_edge");
        assert!(validate_env_name("default").is_ok());
    }

    #[test]
    fn env_names_with_dash_are_rejected() {
        let err = validate_env_name("my-env").unwrap_err();
        assert!(err.to_string().contains("my-env"));
        assert!(validate_env_name("").is_err());
    }
}
