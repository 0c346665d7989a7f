//! Integration tests for devstage

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const ARCHIVE_URL: &str = "gs://bucket/x86-alex-release/R26-4000.0.0";

    /// Temp config serving `gs://bucket/...` from a local tree
    struct Fixture {
        temp: TempDir,
        config: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let build = temp
                .path()
                .join("archive/bucket/x86-alex-release/R26-4000.0.0");
            fs::create_dir_all(&build).unwrap();
            fs::write(build.join("stateful.tgz"), b"stateful").unwrap();
            fs::write(build.join("debug.tgz"), b"debug").unwrap();

            let config = temp.path().join("config.toml");
            fs::write(
                &config,
                format!(
                    r#"
[storage]
static_dir = "{static_dir}"

[remote]
backend = "local"
local_root = "{root}"
max_attempts = 1
initial_backoff_ms = 1

[staging]
wait_timeout_secs = 0
no_wait_timeout_secs = 0
poll_interval_secs = 0

[xbuddy]
capacity = 3
"#,
                    static_dir = temp.path().join("static").display(),
                    root = temp.path().join("archive").display(),
                ),
            )
            .unwrap();

            Self { temp, config }
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("devstage");
            cmd.arg("--config").arg(&self.config).env("CI", "1");
            cmd
        }

        fn build_dir(&self) -> PathBuf {
            self.temp
                .path()
                .join("static/x86-alex-release/R26-4000.0.0")
        }

        fn path(&self) -> &Path {
            self.temp.path()
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("devstage")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("artifact staging"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("devstage")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("devstage"));
    }

    #[test]
    fn stage_copies_artifact_and_file() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["stage", "-a", ARCHIVE_URL, "--artifacts", "stateful", "--files", "debug.tgz"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stateful"));

        assert_eq!(fs::read(fx.build_dir().join("stateful.tgz")).unwrap(), b"stateful");
        assert_eq!(fs::read(fx.build_dir().join("debug.tgz")).unwrap(), b"debug");
    }

    #[test]
    fn is_staged_reports_markers() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["is-staged", "-a", ARCHIVE_URL, "--artifacts", "stateful"])
            .assert()
            .success()
            .stdout(predicate::str::contains("false"));

        fx.cmd()
            .args(["stage", "-a", ARCHIVE_URL, "--artifacts", "stateful"])
            .assert()
            .success();

        fx.cmd()
            .args(["is-staged", "-a", ARCHIVE_URL, "--artifacts", "stateful"])
            .assert()
            .success()
            .stdout(predicate::str::contains("true"));
    }

    #[test]
    fn stage_unknown_artifact_fails() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["stage", "-a", ARCHIVE_URL, "--artifacts", "bogus"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown artifact: bogus"));

        assert!(!fx.build_dir().exists());
    }

    #[test]
    fn failed_stage_is_recorded() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["stage", "-a", ARCHIVE_URL, "--files", "missing.bin"])
            .assert()
            .failure();

        fx.cmd()
            .args(["is-staged", "-a", ARCHIVE_URL, "--files", "missing.bin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Earlier staging of missing.bin failed"));

        fx.cmd()
            .args(["error", "-a", ARCHIVE_URL, "--artifact", "missing.bin"])
            .assert()
            .success()
            .stdout(predicate::str::contains("missing.bin"));
    }

    #[test]
    fn ls_lists_staged_files() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["ls", "-a", ARCHIVE_URL])
            .assert()
            .success()
            .stdout(predicate::str::contains("is not staged"));

        fx.cmd()
            .args(["stage", "-a", ARCHIVE_URL, "--artifacts", "stateful"])
            .assert()
            .success();

        fx.cmd()
            .args(["ls", "-a", ARCHIVE_URL])
            .assert()
            .success()
            .stdout(predicate::str::contains("Listing contents of"))
            .stdout(predicate::str::contains("stateful.tgz"));
    }

    #[test]
    fn artifacts_plain_lists_names() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["artifacts", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("full_payload"))
            .stdout(predicate::str::contains("stateful"));
    }

    #[test]
    fn config_path_uses_flag() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_set_persists() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["config", "set", "xbuddy.capacity", "7"])
            .assert()
            .success();

        fx.cmd()
            .args(["xbuddy", "capacity"])
            .assert()
            .success()
            .stdout(predicate::str::contains("7"));
    }

    #[test]
    fn config_set_rejects_unknown_key() {
        let fx = Fixture::new();
        fx.cmd()
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn xbuddy_get_full_version() {
        let fx = Fixture::new();
        let build = fx
            .path()
            .join("archive/chromeos-image-archive/x86-alex-release/R26-4000.0.0");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("stateful.tgz"), b"stateful").unwrap();

        fx.cmd()
            .args(["xbuddy", "get", "x86-alex/R26-4000.0.0/stateful"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stateful.tgz"));

        fx.cmd()
            .args(["xbuddy", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("x86-alex-release/R26-4000.0.0"));
    }

    #[test]
    fn xbuddy_get_waits_for_prefetch() {
        let fx = Fixture::new();
        let build = fx
            .path()
            .join("archive/chromeos-image-archive/x86-alex-release/R26-4000.0.0");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("chromeos_R26-4000.0.0_x86-alex_full_dev.bin"), b"full").unwrap();
        fs::write(build.join("stateful.tgz"), b"stateful").unwrap();

        fx.cmd()
            .args(["xbuddy", "get", "x86-alex/R26-4000.0.0/full_payload"])
            .assert()
            .success()
            .stdout(predicate::str::contains("update.gz"));

        let staged = fx.path().join("static/x86-alex-release/R26-4000.0.0");
        assert_eq!(fs::read(staged.join("update.gz")).unwrap(), b"full");
        assert_eq!(fs::read(staged.join("stateful.tgz")).unwrap(), b"stateful");
    }
}
