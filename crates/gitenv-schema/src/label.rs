//! Label files and the `previous <- current <- next` promotion chain.
//!
//! Labels live on the environment branch as `labels/<label>.txt`, each holding
//! a single tag name. `latest` is never written; it is derived from tag
//! timestamps at deployment time.

use crate::types::{LabelName, TagName};
use std::collections::BTreeMap;

pub const LABELS_DIR: &str = "labels";
pub const LABEL_FILE_SUFFIX: &str = ".txt";

pub const NEXT: &str = "next";
pub const CURRENT: &str = "current";
pub const PREVIOUS: &str = "previous";
pub const LATEST: &str = "latest";

/// Shift order, oldest first: each label moves into its successor, or falls
/// off the chain when it has none.
pub const LABEL_PROGRESSION: [(&str, Option<&str>); 3] = [
    (PREVIOUS, None),
    (CURRENT, Some(PREVIOUS)),
    (NEXT, Some(CURRENT)),
];

pub fn label_file_path(label: &str) -> String {
    format!("{LABELS_DIR}/{label}{LABEL_FILE_SUFFIX}")
}

/// Label name of a file inside the labels directory, if it is a label file.
pub fn label_from_file_name(file_name: &str) -> Option<LabelName> {
    file_name
        .strip_suffix(LABEL_FILE_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(LabelName::from)
}

/// Tag name stored in a label file.
pub fn parse_label_contents(contents: &str) -> Option<TagName> {
    let trimmed = contents.trim();
    (!trimmed.is_empty()).then(|| TagName::new(trimmed))
}

/// One change to the labels directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelUpdate {
    Write { label: LabelName, tag: TagName },
    Remove { label: LabelName },
}

impl LabelUpdate {
    pub fn path(&self) -> String {
        match self {
            LabelUpdate::Write { label, .. } | LabelUpdate::Remove { label } => {
                label_file_path(label)
            }
        }
    }
}

/// Compute the label changes that advance `next` to `tag`.
///
/// Unless `next_only`, the chain shifts first: `previous` is dropped,
/// `current` becomes `previous` and `next` becomes `current`. Labels outside
/// the chain are never touched.
pub fn plan_promotion(
    existing: &BTreeMap<LabelName, TagName>,
    tag: &TagName,
    next_only: bool,
) -> Vec<LabelUpdate> {
    let mut state: BTreeMap<&str, Option<TagName>> = LABEL_PROGRESSION
        .iter()
        .map(|(label, _)| (*label, existing.get(&LabelName::from(*label)).cloned()))
        .collect();

    if !next_only {
        for (label, successor) in LABEL_PROGRESSION {
            let value = state.get_mut(label).and_then(Option::take);
            if let (Some(value), Some(successor)) = (value, successor) {
                state.insert(successor, Some(value));
            }
        }
    }
    state.insert(NEXT, Some(tag.clone()));

    let mut updates = Vec::new();
    for (label, _) in LABEL_PROGRESSION {
        let before = existing.get(&LabelName::from(label));
        let after = state.get(label).and_then(Option::as_ref);
        match (before, after) {
            (Some(_), None) => updates.push(LabelUpdate::Remove {
                label: LabelName::from(label),
            }),
            (before, Some(after)) if before != Some(after) => updates.push(LabelUpdate::Write {
                label: LabelName::from(label),
                tag: after.clone(),
            }),
            _ => {}
        }
    }
    updates
}

/// Apply a plan to an in-memory label map.
pub fn apply_updates(labels: &mut BTreeMap<LabelName, TagName>, updates: &[LabelUpdate]) {
    for update in updates {
        match update {
            LabelUpdate::Write { label, tag } => {
                labels.insert(label.clone(), tag.clone());
            }
            LabelUpdate::Remove { label } => {
                labels.remove(label);
            }
        }
    }
}
