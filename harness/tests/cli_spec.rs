use assert_cmd::Command;
use predicates::prelude::*;

fn harness() -> Command {
    let mut cmd = Command::cargo_bin("functions-harness").unwrap();
    cmd.env("RUST_LOG", "info");
    cmd
}

#[test]
fn unsupported_language_exits_with_distinguished_status() {
    harness()
        .args(["run", "--language", "cobol"])
        .assert()
        .code(137)
        .stdout(predicate::str::contains("accepted languages"));
}

#[test]
fn unsupported_language_is_rejected_before_any_container_work() {
    // The registry check runs before secrets are read, so even a fully
    // unconfigured process must fail on the language alone.
    harness()
        .env_remove("CLUSTER")
        .env_remove("DATABASE")
        .env_remove("ACCESS_TOKEN")
        .args(["run", "--language", "fortran"])
        .assert()
        .code(137)
        .stdout(predicate::str::contains("fortran"));
}

#[test]
fn missing_credentials_exit_with_distinguished_status() {
    harness()
        .env_remove("CLUSTER")
        .env_remove("DATABASE")
        .env_remove("ACCESS_TOKEN")
        .env_remove("PRODUCTS_TABLE_NAME")
        .env_remove("ITEMS_TABLE_NAME")
        .args(["run", "--language", "node"])
        .assert()
        .code(137)
        .stdout(predicate::str::contains("CLUSTER"));
}

#[test]
fn version_prints_the_crate_version() {
    harness()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
