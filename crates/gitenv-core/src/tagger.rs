use crate::CoreError;
use gitenv_repo::{GitRepo, Snapshot, TagInfo};
use gitenv_schema::{
    commit_date, is_manifest_branch, snapshot_tag_base, snapshot_tag_candidate, validate_env_name,
    EnvName, MANIFEST_BRANCH_PREFIX,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub struct SnapshotTagger<'a> {
    repo: &'a GitRepo,
}

impl<'a> SnapshotTagger<'a> {
    pub fn new(repo: &'a GitRepo) -> Self {
        Self { repo }
    }

    /// Tags for every manifest branch tip that has none yet, created one at a
    /// time as the iterator is consumed. Dropping it early leaves the
    /// remaining tips untagged for the next run.
    pub fn tag_new_snapshots(&self) -> Result<NewSnapshots<'a>, CoreError> {
        let existing = self.repo.tags()?;
        let tagged: HashSet<Snapshot> = existing.iter().map(|t| t.target).collect();
        let taken: HashSet<String> = existing.into_iter().map(|t| t.name).collect();

        let mut pending = Vec::new();
        for branch in self.repo.local_branches()? {
            if !is_manifest_branch(&branch) {
                continue;
            }
            let name = &branch[MANIFEST_BRANCH_PREFIX.len()..];
            let env = match validate_env_name(name) {
                Ok(env) => env,
                Err(e) => {
                    warn!("not tagging {branch}: {e}");
                    continue;
                }
            };
            let Some(tip) = self.repo.branch_tip(&branch)? else {
                continue;
            };
            if tagged.contains(&tip) {
                debug!("{branch}: tip {} already tagged", tip.commit_id());
                continue;
            }
            pending.push((env, tip));
        }

        Ok(NewSnapshots {
            repo: self.repo,
            pending: pending.into_iter(),
            tagged,
            taken,
        })
    }
}

pub struct NewSnapshots<'a> {
    repo: &'a GitRepo,
    pending: std::vec::IntoIter<(EnvName, Snapshot)>,
    tagged: HashSet<Snapshot>,
    taken: HashSet<String>,
}

impl NewSnapshots<'_> {
    fn tag_one(&mut self, env: &EnvName, tip: Snapshot) -> Result<TagInfo, CoreError> {
        let base = snapshot_tag_base(env, commit_date(tip.time())?);
        let mut n = 0;
        let name = loop {
            let candidate = snapshot_tag_candidate(&base, n);
            if !self.taken.contains(candidate.as_str()) {
                break candidate;
            }
            n += 1;
        };

        let info = self
            .repo
            .create_tag(&name, &tip, &format!("Automatic tag of {env}."))?;
        info!("tagged {} as {name}", tip.commit_id());
        self.taken.insert(name.into_inner());
        self.tagged.insert(tip);
        Ok(info)
    }
}

impl Iterator for NewSnapshots<'_> {
    type Item = Result<TagInfo, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((env, tip)) = self.pending.next() {
            if self.tagged.contains(&tip) {
                continue;
            }
            return Some(self.tag_one(&env, tip));
        }
        None
    }
}
