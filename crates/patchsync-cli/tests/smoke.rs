use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CONFIG_ENV: [&str; 5] = [
    "PATCHSYNC_NATIVE_BINDING",
    "PATCHSYNC_HTTPD_URL",
    "PATCHSYNC_RAD_PATH",
    "PATCHSYNC_WORKSPACE",
    "RAD_HOME",
];

fn run_cli(args: &[&str], cwd: &Path) -> std::process::Output {
    run_cli_with_env(args, cwd, &[])
}

fn run_cli_with_env(args: &[&str], cwd: &Path, env: &[(&str, &str)]) -> std::process::Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_patchsync"));
    for key in CONFIG_ENV {
        command.env_remove(key);
    }
    command.env_remove("RUST_LOG");
    command
        .envs(env.iter().copied())
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("cli process should start")
}

#[test]
fn help_lists_every_command() {
    let temp = TempDir::new().expect("temp dir should create");
    let output = run_cli(&["--help"], temp.path());
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["validate", "projects", "project", "patches", "patch", "diff"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn validate_against_unreachable_node_fails() {
    let temp = TempDir::new().expect("temp dir should create");
    let output = run_cli(
        &["--httpd-url", "http://127.0.0.1:9/api/v1", "validate", "--quiet"],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("node unreachable (http)"), "stdout: {stdout}");
}

#[test]
fn debug_log_reports_command_dispatch_on_stderr() {
    let temp = TempDir::new().expect("temp dir should create");
    let output = run_cli_with_env(
        &["--httpd-url", "http://127.0.0.1:9/api/v1", "validate", "--quiet"],
        temp.path(),
        &[("RUST_LOG", "debug")],
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dispatching command"), "stderr: {stderr}");
    assert!(stderr.contains("validate"), "stderr: {stderr}");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("dispatching command"));
}

#[test]
fn dotenv_file_configures_the_node_url() {
    let temp = TempDir::new().expect("temp dir should create");
    std::fs::write(
        temp.path().join(".env"),
        "PATCHSYNC_HTTPD_URL=http://127.0.0.1:9/api/v1\n",
    )
    .expect(".env should be written");

    let output = run_cli(&["validate", "--quiet"], temp.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("node unreachable"));
}

#[cfg(not(feature = "radicle"))]
#[test]
fn native_binding_without_library_reports_error() {
    let temp = TempDir::new().expect("temp dir should create");
    let output = run_cli(&["--native-binding", "validate"], temp.path());

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: unsupported operation"), "stderr: {stderr}");
}

#[test]
fn unknown_status_filter_is_rejected() {
    let temp = TempDir::new().expect("temp dir should create");
    let output = run_cli(&["patches", "--status", "closed"], temp.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("draft, open, archived, merged"), "stderr: {stderr}");
}
