//! CLI subprocess integration tests.
//!
//! These tests run the `gitenv` binary against a bare origin repository on
//! disk and check exit codes, stdout content and what lands in the origin.

use gitenv_repo::{FileChange, GitRepo};
use gitenv_schema::{parse_tag, SPEC_FILE};
use std::path::PathBuf;
use std::process::{Command, Output};

const SPEC: &str = "env:\n  - python\nchannels:\n  - https://conda.example.com/main\n";

struct Fixture {
    dir: tempfile::TempDir,
    origin: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let origin = dir.path().join("origin.git");
        let repo = GitRepo::init_bare(&origin).unwrap();
        repo.commit_changes("default", &[FileChange::write(SPEC_FILE, SPEC)], "Add default")
            .unwrap();
        repo.set_head_branch("default").unwrap();
        std::fs::create_dir(dir.path().join("home")).unwrap();
        Self { dir, origin }
    }

    fn uri(&self) -> &str {
        self.origin.to_str().unwrap()
    }

    fn target(&self) -> PathBuf {
        self.dir.path().join("target")
    }

    fn origin(&self) -> GitRepo {
        GitRepo::open(&self.origin).unwrap()
    }

    fn gitenv(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gitenv"));
        cmd.env("HOME", self.dir.path().join("home"))
            .env_remove("GITENV_CONFIG")
            .env_remove("GITENV_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.gitenv().args(args).output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit {:?}\nstdout: {}\nstderr: {}",
        output.status.code(),
        stdout(output),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn autotag(fx: &Fixture) -> Vec<String> {
    let output = fx.run(&["--json", "autotag", fx.uri()]);
    assert_success(&output);
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    parsed["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap().to_owned())
        .collect()
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_gitenv"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("gitenv"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_gitenv"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["resolve", "autotag", "autolabel", "deploy", "completions"] {
        assert!(text.contains(command), "help is missing {command}");
    }
}

#[test]
fn cli_resolve_tag_label_deploy() {
    let fx = Fixture::new();

    let output = fx.run(&["--backend", "mock", "resolve", fx.uri()]);
    assert_success(&output);
    assert!(stdout(&output).contains("Pushing changes to manifest/default"));
    let origin = fx.origin();
    let tip = origin.branch_tip("manifest/default").unwrap().unwrap();
    let manifest = origin.read_file(&tip, "env.manifest").unwrap().unwrap();
    assert!(String::from_utf8(manifest).unwrap().contains("python-1.0-mock_0"));

    let tags = autotag(&fx);
    assert_eq!(tags.len(), 1);
    let tag = &tags[0];
    assert!(tag.starts_with("env-default-"));
    assert!(fx.origin().find_tag(tag).unwrap().is_some());

    let output = fx.run(&["autolabel", fx.uri(), tag]);
    assert_success(&output);
    assert!(stdout(&output).contains("Pushing changes to default"));

    let target = fx.target();
    let output = fx.run(&["--backend", "mock", "deploy", fx.uri(), target.to_str().unwrap()]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Linking default/next to"), "{text}");
    assert!(text.contains("Linking default/latest to"), "{text}");

    let deployed = parse_tag(tag).unwrap().deployed_name;
    assert!(target.join("default").join(&deployed).join("bin/python").is_file());

    // A second run finds everything in place.
    let output = fx.run(&["--backend", "mock", "deploy", fx.uri(), target.to_str().unwrap()]);
    assert_success(&output);
    assert!(!stdout(&output).contains("Linking"));
}

#[test]
fn cli_second_resolve_pushes_nothing() {
    let fx = Fixture::new();
    assert_success(&fx.run(&["--backend", "mock", "resolve", fx.uri()]));
    let output = fx.run(&["--backend", "mock", "resolve", fx.uri()]);
    assert_success(&output);
    assert!(!stdout(&output).contains("Pushing"));
}

#[test]
fn cli_no_push_leaves_origin_alone() {
    let fx = Fixture::new();
    let output = fx.run(&["--backend", "mock", "resolve", "--no-push", fx.uri()]);
    assert_success(&output);
    assert!(!fx.origin().has_branch("manifest/default"));
}

#[test]
fn cli_resolve_json_reports_committed_envs() {
    let fx = Fixture::new();
    let output = fx.run(&["--backend", "mock", "--json", "resolve", fx.uri()]);
    assert_success(&output);
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(parsed["committed"], serde_json::json!(["default"]));
}

#[test]
fn cli_unknown_tag_is_input_error() {
    let fx = Fixture::new();
    let output = fx.run(&["autolabel", fx.uri(), "env-default-1999_01_01"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown tag"));
}

#[test]
fn cli_bad_pattern_is_input_error() {
    let fx = Fixture::new();
    let output = fx.run(&["--backend", "mock", "resolve", fx.uri(), "--envs", "[oops"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_unknown_backend_fails() {
    let fx = Fixture::new();
    let output = fx.run(&["--backend", "pip", "resolve", fx.uri()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_config_file_selects_backend() {
    let fx = Fixture::new();
    let config = fx.dir.path().join("gitenv.toml");
    std::fs::write(&config, "backend = \"mock\"\n").unwrap();
    let output = fx
        .gitenv()
        .env("GITENV_CONFIG", &config)
        .args(["resolve", fx.uri()])
        .output()
        .unwrap();
    assert_success(&output);
    assert!(fx.origin().has_branch("manifest/default"));
}

#[test]
fn cli_invalid_config_fails() {
    let fx = Fixture::new();
    let config = fx.dir.path().join("gitenv.toml");
    std::fs::write(&config, "colour = \"blue\"\n").unwrap();
    let output = fx.run(&["--config", config.to_str().unwrap(), "autotag", fx.uri()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid config"));
}

#[test]
fn cli_completions_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_gitenv"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("gitenv"));
}

#[test]
fn cli_unreachable_repo_fails() {
    let fx = Fixture::new();
    let missing = fx.dir.path().join("nowhere.git");
    let output = fx.run(&["autotag", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_default_build_speaks_https() {
    let fx = Fixture::new();
    let output = fx.run(&["autotag", "https://127.0.0.1:9/none.git"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("https support"), "{stderr}");
    assert!(!stderr.contains("no TLS stream"), "{stderr}");
}
