use crate::CoreError;
use gitenv_repo::{FileChange, GitRepo, Snapshot, TagInfo};
use gitenv_schema::{
    label_from_file_name, parse_label_contents, parse_tag, plan_promotion, EnvName, LabelName,
    LabelUpdate, TagName, LABELS_DIR,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Persisted labels of an environment branch snapshot.
pub fn read_labels(
    repo: &GitRepo,
    snapshot: &Snapshot,
) -> Result<BTreeMap<LabelName, TagName>, CoreError> {
    let mut labels = BTreeMap::new();
    for (file_name, contents) in repo.list_files(snapshot, LABELS_DIR)? {
        let Some(label) = label_from_file_name(&file_name) else {
            debug!("ignoring {LABELS_DIR}/{file_name}");
            continue;
        };
        if let Some(tag) = parse_label_contents(&String::from_utf8_lossy(&contents)) {
            labels.insert(label, tag);
        }
    }
    Ok(labels)
}

/// The tag of `env` with the newest commit. Ties go to the greatest name,
/// i.e. the highest same-day suffix.
pub fn latest_tag(tags: &[TagInfo], env: &str) -> Option<TagName> {
    tags.iter()
        .filter(|t| parse_tag(&t.name).is_ok_and(|p| p.env == env))
        .max_by(|a, b| {
            a.target
                .time()
                .cmp(&b.target.time())
                .then_with(|| a.name.cmp(&b.name))
        })
        .map(|t| TagName::new(t.name.clone()))
}

pub struct LabelPromoter<'a> {
    repo: &'a GitRepo,
}

impl<'a> LabelPromoter<'a> {
    pub fn new(repo: &'a GitRepo) -> Self {
        Self { repo }
    }

    /// Point `next` at `tag` on the tag's environment branch, shifting the
    /// rest of the chain unless `next_only`. Returns the branch updated.
    pub fn promote(&self, tag: &str, next_only: bool) -> Result<EnvName, CoreError> {
        if self.repo.find_tag(tag)?.is_none() {
            return Err(CoreError::UnknownTag(tag.to_owned()));
        }
        let env = parse_tag(tag)?.env;
        let tip = self
            .repo
            .branch_tip(&env)?
            .ok_or_else(|| CoreError::UnknownBranch(env.to_string()))?;

        let existing = read_labels(self.repo, &tip)?;
        let tag = TagName::new(tag);
        let changes: Vec<FileChange> = plan_promotion(&existing, &tag, next_only)
            .into_iter()
            .map(|update| match update {
                LabelUpdate::Write { ref tag, .. } => {
                    FileChange::write(update.path(), tag.as_str())
                }
                LabelUpdate::Remove { .. } => FileChange::remove(update.path()),
            })
            .collect();

        let message = format!("Updated next label to {tag}.");
        match self.repo.commit_changes(&env, &changes, &message)? {
            Some(_) => info!("{env}: next -> {tag}"),
            None => debug!("{env}: labels already in place"),
        }
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitenv_schema::{CURRENT, NEXT, PREVIOUS};

    const DAY: i64 = 1_706_695_200;

    fn fixture() -> (tempfile::TempDir, GitRepo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = GitRepo::init_bare(dir.path()).unwrap();
        repo.commit_changes_at("default", &[FileChange::write("env.spec", "env: []\n")], "s", DAY)
            .unwrap();
        for (i, name) in ["t1", "t2", "t3", "t4"].iter().enumerate() {
            let tip = repo
                .commit_changes_at(
                    "manifest/default",
                    &[FileChange::write("env.manifest", format!("a\tp-{i}-0\n"))],
                    "m",
                    DAY + i as i64,
                )
                .unwrap()
                .unwrap();
            repo.create_tag(&format!("env-default-{name}"), &tip, "t").unwrap();
        }
        (dir, repo)
    }

    fn labels(repo: &GitRepo) -> BTreeMap<String, String> {
        let tip = repo.branch_tip("default").unwrap().unwrap();
        read_labels(repo, &tip)
            .unwrap()
            .into_iter()
            .map(|(l, t)| (l.into_inner(), t.into_inner()))
            .collect()
    }

    #[test]
    fn chain_shifts_then_next_only() {
        let (_dir, repo) = fixture();
        let promoter = LabelPromoter::new(&repo);
        for t in ["t1", "t2", "t3"] {
            let env = promoter.promote(&format!("env-default-{t}"), false).unwrap();
            assert_eq!(env, "default");
        }
        let after = labels(&repo);
        assert_eq!(after[PREVIOUS], "env-default-t1");
        assert_eq!(after[CURRENT], "env-default-t2");
        assert_eq!(after[NEXT], "env-default-t3");

        promoter.promote("env-default-t4", true).unwrap();
        let after = labels(&repo);
        assert_eq!(after[PREVIOUS], "env-default-t1");
        assert_eq!(after[CURRENT], "env-default-t2");
        assert_eq!(after[NEXT], "env-default-t4");
    }

    #[test]
    fn label_files_hold_the_bare_tag_name() {
        let (_dir, repo) = fixture();
        LabelPromoter::new(&repo)
            .promote("env-default-t1", false)
            .unwrap();
        let tip = repo.branch_tip("default").unwrap().unwrap();
        assert_eq!(
            repo.read_file(&tip, "labels/next.txt").unwrap().unwrap(),
            b"env-default-t1"
        );
        assert!(repo.read_file(&tip, "labels/current.txt").unwrap().is_none());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let (_dir, repo) = fixture();
        assert!(matches!(
            LabelPromoter::new(&repo).promote("env-default-nope", false),
            Err(CoreError::UnknownTag(_))
        ));
    }

    #[test]
    fn tag_without_environment_branch_is_rejected() {
        let (_dir, repo) = fixture();
        let tip = repo.branch_tip("manifest/default").unwrap().unwrap();
        repo.create_tag("env-ghost-2024_01_31", &tip, "t").unwrap();
        assert!(matches!(
            LabelPromoter::new(&repo).promote("env-ghost-2024_01_31", false),
            Err(CoreError::UnknownBranch(b)) if b == "ghost"
        ));
    }

    #[test]
    fn latest_prefers_newest_then_greatest_name() {
        let (_dir, repo) = fixture();
        let tags = repo.tags().unwrap();
        assert_eq!(latest_tag(&tags, "default").unwrap(), "env-default-t4");
        assert!(latest_tag(&tags, "bleeding").is_none());

        let tip = repo.branch_tip("manifest/default").unwrap().unwrap();
        repo.create_tag("env-default-t4-1", &tip, "t").unwrap();
        let tags = repo.tags().unwrap();
        assert_eq!(latest_tag(&tags, "default").unwrap(), "env-default-t4-1");
    }
}
