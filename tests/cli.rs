use assert_cmd::Command;
use predicates::prelude::*;

fn cairo_pilot() -> Command {
    let mut cmd = Command::cargo_bin("cairo-pilot").unwrap();
    cmd.env_remove("APPWRITE_ENDPOINT")
        .env_remove("APPWRITE_PROJECT_ID")
        .env_remove("APPWRITE_API_KEY")
        .env_remove("APPWRITE_OAUTH_SUCCESS_URL")
        .env_remove("APPWRITE_OAUTH_FAILURE_URL");
    cmd
}

const GATEWAY: [&str; 4] = ["--endpoint", "https://gw.example.com/v1", "--project", "cairo"];

#[test]
fn test_cli_help() {
    cairo_pilot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cairo-pilot [OPTIONS] <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("login-url"))
        .stdout(predicate::str::contains("--endpoint <ENDPOINT>"))
        .stdout(predicate::str::contains("--project <PROJECT>"))
        .stdout(predicate::str::contains("--api-key <API_KEY>"))
        .stdout(predicate::str::contains("--oauth-success-url <OAUTH_SUCCESS_URL>"))
        .stdout(predicate::str::contains("--oauth-failure-url <OAUTH_FAILURE_URL>"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_start_help() {
    cairo_pilot()
        .arg("start")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cairo-pilot start"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("--templates <TEMPLATES>"))
        .stdout(predicate::str::contains("--reply-delay-ms <REPLY_DELAY_MS>"));
}

#[test]
fn test_cli_chat_help() {
    cairo_pilot()
        .arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cairo-pilot chat"));
}

#[test]
fn test_cli_no_command() {
    // Running without a command should show help/usage
    cairo_pilot()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: cairo-pilot [OPTIONS] <COMMAND>"));
}

#[test]
fn test_login_url_prints_gateway_url() {
    cairo_pilot()
        .args(GATEWAY)
        .args(["login-url", "github"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "https://gw.example.com/v1/account/tokens/oauth2/github?project=cairo",
        ));
}

#[test]
fn test_login_url_redirects_to_server_port() {
    cairo_pilot()
        .args(GATEWAY)
        .args(["login-url", "google", "--port", "8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "success=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fcallback",
        ))
        .stdout(predicate::str::contains(
            "failure=http%3A%2F%2Flocalhost%3A8080%2F%3Flogin%3Dfailed",
        ))
        .stdout(predicate::str::contains("9900").not());
}

#[test]
fn test_login_url_redirect_flags_override_port() {
    cairo_pilot()
        .args(GATEWAY)
        .args(["--oauth-success-url", "https://pilot.example.com/cb"])
        .args(["login-url", "github", "--port", "8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "success=https%3A%2F%2Fpilot.example.com%2Fcb",
        ))
        .stdout(predicate::str::contains(
            "failure=http%3A%2F%2Flocalhost%3A8080%2F%3Flogin%3Dfailed",
        ));
}

#[test]
fn test_redirect_env_overrides_port_default() {
    cairo_pilot()
        .args(GATEWAY)
        .env("APPWRITE_OAUTH_FAILURE_URL", "https://pilot.example.com/oops")
        .args(["login-url", "github", "--port", "8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "failure=https%3A%2F%2Fpilot.example.com%2Foops",
        ));
}

#[test]
fn test_login_url_rejects_unknown_provider() {
    cairo_pilot()
        .args(GATEWAY)
        .args(["login-url", "gitlab"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported OAuth provider 'gitlab'"));
}

#[test]
fn test_login_url_without_config_fails() {
    cairo_pilot()
        .args(["login-url", "google"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot build the login URL"));
}

#[test]
fn test_terminal_chat_session() {
    cairo_pilot()
        .args(["chat", "--reply-delay-ms", "0"])
        .write_stdin("/list\nhello\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("* 1. Cairo Contract Review"))
        .stdout(predicate::str::contains("I received your message: \"hello\""));
}
