use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    fixtures: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let fixtures = base.join("fixtures");

        for dir in [&home, &xdg_data, &xdg_config, &xdg_state, &fixtures] {
            fs::create_dir_all(dir).expect("failed to create test directory");
        }

        // Poll fast so charts do not sleep a full second per poll
        fs::create_dir_all(xdg_config.join("repopulse")).expect("failed to create config dir");
        fs::write(
            xdg_config.join("repopulse/config.toml"),
            "[cache]\npoll_interval_ms = 10\nmax_wait_secs = 30\n",
        )
        .expect("failed to write config");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            fixtures,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("repopulse/events.db")
    }

    fn fixture(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.fixtures.join(name);
        fs::write(&path, lines.join("\n")).expect("failed to write fixture");
        path
    }
}

fn run(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("repopulse"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute repopulse: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "repopulse {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn import(env: &CliTestEnv, domain: &str, file: &PathBuf) -> Output {
    let file = file.to_string_lossy().into_owned();
    let args = ["import", domain, file.as_str()];
    let output = run(env, &args);
    assert_success(&args, &output);
    output
}

#[test]
fn list_without_snapshot_shows_charts() {
    let env = CliTestEnv::new();

    let output = run(&env, &["list"]);
    assert_success(&["list"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for chart in [
        "closure-ratio",
        "release-frequency",
        "issue-assignments",
        "review-comments",
        "commit-frequency",
        "contributors",
    ] {
        assert!(stdout.contains(chart), "missing {chart} in:\n{stdout}");
    }
    assert!(stdout.contains("No snapshot at"));
}

#[test]
fn import_then_chart_exports_json() {
    let env = CliTestEnv::new();
    let prs = env.fixture(
        "prs.jsonl",
        &[
            r#"{"id": 1, "repo_id": 7, "created": "2024-01-15T10:00:00Z", "closed": "2024-01-20T10:00:00Z"}"#,
            r#"{"id": 2, "repo_id": 7, "created": "2024-02-03T10:00:00Z"}"#,
            r#"{"id": 3, "repo_id": 7, "created": "2024-02-20T10:00:00Z"}"#,
            "not json",
        ],
    );

    let output = import(&env, "pull_requests", &prs);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Imported: 3"), "unexpected import output:\n{stdout}");
    assert!(stdout.contains("Skipped:  1"));
    assert!(env.db_path().exists());

    let args = ["chart", "closure-ratio", "--repo", "7", "--interval", "M", "--export", "json"];
    let output = run(&env, &args);
    assert_success(&args, &output);

    let chart: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("chart output should be JSON");
    assert_eq!(chart["status"], "ready");
    assert_eq!(chart["granularity"], "month");

    let created = chart["series"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "Created")
        .expect("missing Created series");
    assert_eq!(created["points"][0]["x"], "2024-01-01");
    assert_eq!(created["points"][0]["y"], 1.0);
    assert_eq!(created["points"][1]["x"], "2024-02-01");
    assert_eq!(created["points"][1]["y"], 2.0);

    let list = run(&env, &["list"]);
    assert_success(&["list"], &list);
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains("pull_requests"));
    assert!(stdout.contains("Repositories: 7"));
}

#[test]
fn chart_without_data_prints_no_data() {
    let env = CliTestEnv::new();
    let args = ["chart", "release-frequency", "--repo", "1"];

    let output = run(&env, &args);
    assert_success(&args, &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No data: no records available"), "got:\n{stdout}");
}

#[test]
fn contributor_chart_respects_date_filter() {
    let env = CliTestEnv::new();
    let contributions = env.fixture(
        "contributions.jsonl",
        &[
            r#"{"id": "c1", "repo_id": 3, "created": "2024-03-02T00:00:00Z", "cntrb_id": "alice"}"#,
            r#"{"id": "c2", "repo_id": 3, "created": "2024-03-09T00:00:00Z", "cntrb_id": "bob"}"#,
            r#"{"id": "c3", "repo_id": 3, "created": "2024-03-10T00:00:00Z", "cntrb_id": "bob"}"#,
            r#"{"id": "c4", "repo_id": 3, "created": "2024-04-01T00:00:00Z", "cntrb_id": "alice"}"#,
        ],
    );
    import(&env, "contributions", &contributions);

    let args = [
        "chart",
        "contributors",
        "--repo",
        "3",
        "--start",
        "2024-03-05",
        "--end",
        "2024-03-31",
        "--export",
        "json",
    ];
    let output = run(&env, &args);
    assert_success(&args, &output);

    let chart: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let points = chart["series"][0]["points"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["x"], "2024-03-01");
    assert_eq!(points[0]["y"], 1.0);
}

#[test]
fn invalid_arguments_fail() {
    let env = CliTestEnv::new();

    let output = run(&env, &["chart", "burndown", "--repo", "1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown visualization"), "got:\n{stderr}");

    let output = run(&env, &["chart", "closure-ratio", "--repo", "1", "--interval", "Q"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid granularity"), "got:\n{stderr}");

    let output = run(
        &env,
        &["chart", "commit-frequency", "--repo", "1", "--interval", "W"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("--interval does not apply to commit-frequency"),
        "got:\n{stderr}"
    );

    let output = run(
        &env,
        &["chart", "closure-ratio", "--repo", "1", "--start", "2024-01-01"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("--start/--end do not apply to closure-ratio"),
        "got:\n{stderr}"
    );

    let output = run(&env, &["import", "wikis", "/dev/null"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown domain"), "got:\n{stderr}");
}
