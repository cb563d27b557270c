use crate::RepoError;
use git2::build::{RepoBuilder, TreeUpdateBuilder};
use git2::{
    AutotagOption, BranchType, Commit, ErrorCode, FetchOptions, FileMode, ObjectType, Oid,
    PushOptions, RemoteCallbacks, Repository, Signature, Time,
};
use std::path::Path;
use tracing::{debug, info};

pub const ORIGIN: &str = "origin";
const DEFAULT_AUTHOR: &str = "gitenv";
const DEFAULT_EMAIL: &str = "gitenv@localhost";

/// Whether the linked libgit2 carries a TLS transport.
pub fn https_supported() -> bool {
    git2::Version::get().https()
}

/// Immutable handle on one commit: everything reads through it, nothing is
/// checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snapshot {
    id: Oid,
    time: i64,
}

impl Snapshot {
    fn of(commit: &Commit<'_>) -> Self {
        Self {
            id: commit.id(),
            time: commit.time().seconds(),
        }
    }

    pub fn commit_id(&self) -> String {
        self.id.to_string()
    }

    /// Committer timestamp, seconds since the epoch.
    pub fn time(&self) -> i64 {
        self.time
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub target: Snapshot,
}

/// A change staged for a tree-level commit. Paths are `/`-separated and
/// relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Write { path: String, contents: Vec<u8> },
    Remove { path: String },
}

impl FileChange {
    pub fn write(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        FileChange::Write {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        FileChange::Remove { path: path.into() }
    }
}

/// One clone of the tracking repository, owned by one process.
///
/// Commits are built directly from trees and written to branch refs, so the
/// clone can be bare and no operation depends on a shared working directory.
pub struct GitRepo {
    inner: Repository,
}

impl GitRepo {
    pub fn clone_bare(url: &str, dest: &Path) -> Result<Self, RepoError> {
        if url.starts_with("https://") && !https_supported() {
            return Err(RepoError::HttpsUnsupported(url.to_owned()));
        }
        info!("cloning {url} into {}", dest.display());
        let inner = RepoBuilder::new().bare(true).clone(url, dest)?;
        Ok(Self { inner })
    }

    pub fn open(path: &Path) -> Result<Self, RepoError> {
        Ok(Self {
            inner: Repository::open(path)?,
        })
    }

    pub fn init_bare(path: &Path) -> Result<Self, RepoError> {
        Ok(Self {
            inner: Repository::init_bare(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Point `HEAD` at a branch; a clone uses it to pick its default branch.
    pub fn set_head_branch(&self, branch: &str) -> Result<(), RepoError> {
        self.inner.set_head(&format!("refs/heads/{branch}"))?;
        Ok(())
    }

    pub fn fetch_all(&self) -> Result<(), RepoError> {
        let remotes = self.inner.remotes()?;
        for name in remotes.iter().flatten() {
            debug!("fetching {name}");
            let mut remote = self.inner.find_remote(name)?;
            let mut opts = FetchOptions::new();
            opts.download_tags(AutotagOption::All);
            remote.fetch(&[] as &[&str], Some(&mut opts), None)?;
        }
        Ok(())
    }

    /// Create a local branch, tracking its remote counterpart, for every
    /// remote branch that has no local branch yet. Returns the names created.
    pub fn create_tracking_branches(&self) -> Result<Vec<String>, RepoError> {
        let mut created = Vec::new();
        for entry in self.inner.branches(Some(BranchType::Remote))? {
            let (branch, _) = entry?;
            let Some(full) = branch.name()? else {
                continue;
            };
            let Some((_, head)) = full.split_once('/') else {
                continue;
            };
            if head == "HEAD" || self.has_branch(head) {
                continue;
            }
            let commit = branch.get().peel_to_commit()?;
            let mut local = self.inner.branch(head, &commit, false)?;
            local.set_upstream(Some(full))?;
            debug!("tracking {full} as {head}");
            created.push(head.to_owned());
        }
        Ok(created)
    }

    pub fn local_branches(&self) -> Result<Vec<String>, RepoError> {
        let mut names = Vec::new();
        for entry in self.inner.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    pub fn branch_tip(&self, name: &str) -> Result<Option<Snapshot>, RepoError> {
        match self.inner.find_branch(name, BranchType::Local) {
            Ok(branch) => {
                let commit = branch.get().peel_to_commit()?;
                Ok(Some(Snapshot::of(&commit)))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn create_branch(&self, name: &str, from: &Snapshot) -> Result<(), RepoError> {
        let commit = self.inner.find_commit(from.id)?;
        self.inner.branch(name, &commit, false)?;
        debug!("created branch {name} at {}", from.commit_id());
        Ok(())
    }

    /// True when the local branch has no upstream or points elsewhere.
    pub fn differs_from_upstream(&self, branch: &str) -> Result<bool, RepoError> {
        let local = self.inner.find_branch(branch, BranchType::Local)?;
        let local_id = local.get().target();
        match local.upstream() {
            Ok(upstream) => Ok(upstream.get().target() != local_id),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_file(&self, snapshot: &Snapshot, path: &str) -> Result<Option<Vec<u8>>, RepoError> {
        let tree = self.inner.find_commit(snapshot.id)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = self.inner.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    /// Regular files directly inside `dir`, as `(file name, contents)`.
    pub fn list_files(
        &self,
        snapshot: &Snapshot,
        dir: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, RepoError> {
        let tree = self.inner.find_commit(snapshot.id)?.tree()?;
        let entry = match tree.get_path(Path::new(dir)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Tree) {
            return Ok(Vec::new());
        }
        let subtree = self.inner.find_tree(entry.id())?;
        let mut files = Vec::new();
        for item in subtree.iter() {
            if item.kind() != Some(ObjectType::Blob) {
                continue;
            }
            let Some(name) = item.name() else {
                continue;
            };
            let blob = self.inner.find_blob(item.id())?;
            files.push((name.to_owned(), blob.content().to_vec()));
        }
        Ok(files)
    }

    pub fn commit_changes(
        &self,
        branch: &str,
        changes: &[FileChange],
        message: &str,
    ) -> Result<Option<Snapshot>, RepoError> {
        self.commit_changes_at(branch, changes, message, chrono::Utc::now().timestamp())
    }

    /// Apply `changes` on top of the tip of `branch` and commit, dated `when`.
    ///
    /// Returns `None` without committing when the resulting tree equals the
    /// tip's tree. A missing branch is created with a root commit.
    pub fn commit_changes_at(
        &self,
        branch: &str,
        changes: &[FileChange],
        message: &str,
        when: i64,
    ) -> Result<Option<Snapshot>, RepoError> {
        let parent = match self.branch_tip(branch)? {
            Some(tip) => Some(self.inner.find_commit(tip.id)?),
            None => None,
        };
        let base_tree = match &parent {
            Some(commit) => commit.tree()?,
            None => {
                let empty = self.inner.treebuilder(None)?.write()?;
                self.inner.find_tree(empty)?
            }
        };

        let mut update = TreeUpdateBuilder::new();
        for change in changes {
            match change {
                FileChange::Write { path, contents } => {
                    let blob = self.inner.blob(contents)?;
                    update.upsert(path.as_str(), blob, FileMode::Blob);
                }
                FileChange::Remove { path } => {
                    // libgit2 refuses to remove entries that are not there.
                    if base_tree.get_path(Path::new(path)).is_ok() {
                        update.remove(path.as_str());
                    }
                }
            }
        }
        let tree_id = update.create_updated(&self.inner, &base_tree)?;

        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
            debug!("{branch}: tree unchanged, nothing to commit");
            return Ok(None);
        }

        let tree = self.inner.find_tree(tree_id)?;
        let sig = self.signature_at(when)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self.inner.commit(
            Some(&format!("refs/heads/{branch}")),
            &sig,
            &sig,
            message,
            &tree,
            &parents,
        )?;
        let commit = self.inner.find_commit(oid)?;
        debug!("{branch}: committed {oid}");
        Ok(Some(Snapshot::of(&commit)))
    }

    pub fn tags(&self) -> Result<Vec<TagInfo>, RepoError> {
        let names = self.inner.tag_names(None)?;
        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            if let Some(info) = self.find_tag(name)? {
                tags.push(info);
            }
        }
        Ok(tags)
    }

    /// Look up a tag and the commit it points at. Unknown or malformed names
    /// read as `None`.
    pub fn find_tag(&self, name: &str) -> Result<Option<TagInfo>, RepoError> {
        let reference = match self.inner.find_reference(&format!("refs/tags/{name}")) {
            Ok(reference) => reference,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        match reference.peel_to_commit() {
            Ok(commit) => Ok(Some(TagInfo {
                name: name.to_owned(),
                target: Snapshot::of(&commit),
            })),
            Err(e) => {
                debug!("tag {name} does not point at a commit: {e}");
                Ok(None)
            }
        }
    }

    /// Create an annotated tag on `target`.
    pub fn create_tag(
        &self,
        name: &str,
        target: &Snapshot,
        message: &str,
    ) -> Result<TagInfo, RepoError> {
        let commit = self.inner.find_commit(target.id)?;
        let sig = self.signature_at(chrono::Utc::now().timestamp())?;
        self.inner
            .tag(name, commit.as_object(), &sig, message, false)?;
        Ok(TagInfo {
            name: name.to_owned(),
            target: *target,
        })
    }

    pub fn push_branch(&self, branch: &str) -> Result<(), RepoError> {
        self.push(&format!("refs/heads/{branch}:refs/heads/{branch}"))
    }

    pub fn push_tag(&self, tag: &str) -> Result<(), RepoError> {
        self.push(&format!("refs/tags/{tag}:refs/tags/{tag}"))
    }

    fn push(&self, refspec: &str) -> Result<(), RepoError> {
        let mut remote = self.inner.find_remote(ORIGIN)?;
        let mut rejection: Option<String> = None;
        let result = {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|refname, status| {
                if let Some(msg) = status {
                    rejection = Some(format!("{refname}: {msg}"));
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote.push(&[refspec], Some(&mut opts))
        };
        match result {
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                return Err(RepoError::PushConflict {
                    refspec: refspec.to_owned(),
                    reason: e.message().to_owned(),
                })
            }
            Err(e) => return Err(e.into()),
            Ok(()) => {}
        }
        if let Some(reason) = rejection {
            return Err(RepoError::PushConflict {
                refspec: refspec.to_owned(),
                reason,
            });
        }
        debug!("pushed {refspec}");
        Ok(())
    }

    fn signature_at(&self, seconds: i64) -> Result<Signature<'static>, RepoError> {
        let (name, email) = match self.inner.signature() {
            Ok(sig) => (
                sig.name().unwrap_or(DEFAULT_AUTHOR).to_owned(),
                sig.email().unwrap_or(DEFAULT_EMAIL).to_owned(),
            ),
            Err(_) => (DEFAULT_AUTHOR.to_owned(), DEFAULT_EMAIL.to_owned()),
        };
        Ok(Signature::new(&name, &email, &Time::new(seconds, 0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "https"))]
    #[test]
    fn https_clone_without_tls_names_the_feature() {
        if https_supported() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = GitRepo::clone_bare("https://127.0.0.1:9/none.git", &dir.path().join("c"))
            .err()
            .unwrap();
        assert!(matches!(err, RepoError::HttpsUnsupported(_)));
    }

    #[cfg(feature = "https")]
    #[test]
    fn https_feature_links_a_tls_transport() {
        assert!(https_supported());
    }

    fn origin() -> (tempfile::TempDir, GitRepo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = GitRepo::init_bare(&dir.path().join("origin.git")).unwrap();
        repo.commit_changes_at("default", &[FileChange::write("env.spec", "env: [python]\n")], "Add default spec", 1_000)
            .unwrap();
        repo.set_head_branch("default").unwrap();
        (dir, repo)
    }

    fn url(repo: &GitRepo) -> String {
        repo.path().to_string_lossy().into_owned()
    }

    #[test]
    fn commit_then_read_back() {
        let (_dir, repo) = origin();
        let tip = repo.branch_tip("default").unwrap().unwrap();
        assert_eq!(tip.time(), 1_000);
        assert_eq!(
            repo.read_file(&tip, "env.spec").unwrap().unwrap(),
            b"env: [python]\n"
        );
        assert!(repo.read_file(&tip, "missing").unwrap().is_none());
    }

    #[test]
    fn unchanged_tree_is_not_committed() {
        let (_dir, repo) = origin();
        let again = repo
            .commit_changes("default", &[FileChange::write("env.spec", "env: [python]\n")], "noop")
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn nested_writes_and_removes() {
        let (_dir, repo) = origin();
        repo.commit_changes(
            "default",
            &[
                FileChange::write("labels/next.txt", "t2"),
                FileChange::write("labels/current.txt", "t1"),
            ],
            "labels",
        )
        .unwrap()
        .unwrap();
        let tip = repo
            .commit_changes(
                "default",
                &[FileChange::remove("labels/current.txt"), FileChange::remove("labels/absent.txt")],
                "drop current",
            )
            .unwrap()
            .unwrap();
        let files = repo.list_files(&tip, "labels").unwrap();
        assert_eq!(files, vec![("next.txt".to_owned(), b"t2".to_vec())]);
        assert!(repo.list_files(&tip, "nowhere").unwrap().is_empty());
    }

    #[test]
    fn tags_resolve_to_their_commit() {
        let (_dir, repo) = origin();
        let tip = repo.branch_tip("default").unwrap().unwrap();
        repo.create_tag("env-default-1970_01_01", &tip, "Automatic tag of default.")
            .unwrap();
        let tags = repo.tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].target, tip);
        assert!(repo.find_tag("nope").unwrap().is_none());
        assert!(repo.find_tag("not a valid ref..").unwrap().is_none());
    }

    #[test]
    fn clone_tracks_every_remote_branch() {
        let (dir, origin) = origin();
        let tip = origin.branch_tip("default").unwrap().unwrap();
        origin.create_branch("bleeding", &tip).unwrap();

        let clone = GitRepo::clone_bare(&url(&origin), &dir.path().join("clone")).unwrap();
        clone.fetch_all().unwrap();
        let created = clone.create_tracking_branches().unwrap();
        assert_eq!(created, vec!["bleeding".to_owned()]);
        assert_eq!(clone.local_branches().unwrap(), vec!["bleeding", "default"]);
        assert!(!clone.differs_from_upstream("bleeding").unwrap());
    }

    #[test]
    fn push_publishes_branches_and_tags() {
        let (dir, origin) = origin();
        let clone = GitRepo::clone_bare(&url(&origin), &dir.path().join("clone")).unwrap();
        let tip = clone
            .commit_changes("manifest/default", &[FileChange::write("env.manifest", "\n")], "m")
            .unwrap()
            .unwrap();
        assert!(clone.differs_from_upstream("manifest/default").unwrap());
        clone.push_branch("manifest/default").unwrap();
        clone.create_tag("env-default-1970_01_01", &tip, "t").unwrap();
        clone.push_tag("env-default-1970_01_01").unwrap();

        assert_eq!(origin.branch_tip("manifest/default").unwrap(), Some(tip));
        assert!(origin.find_tag("env-default-1970_01_01").unwrap().is_some());
    }

    #[test]
    fn diverged_push_is_a_conflict() {
        let (dir, origin) = origin();
        let a = GitRepo::clone_bare(&url(&origin), &dir.path().join("a")).unwrap();
        let b = GitRepo::clone_bare(&url(&origin), &dir.path().join("b")).unwrap();

        a.commit_changes("default", &[FileChange::write("labels/next.txt", "a")], "a")
            .unwrap();
        a.push_branch("default").unwrap();

        b.commit_changes("default", &[FileChange::write("labels/next.txt", "b")], "b")
            .unwrap();
        let err = b.push_branch("default").unwrap_err();
        assert!(matches!(err, RepoError::PushConflict { .. }), "{err}");
    }
}
