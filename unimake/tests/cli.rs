use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let tempdir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        let absolute = tempdir.path().join(path);
        fs::create_dir_all(absolute.parent().unwrap()).unwrap();
        fs::write(absolute, contents).unwrap();
    }
    tempdir
}

#[test]
fn help_lists_targets() {
    Command::cargo_bin("unimake")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Targets to run"));
}

#[test]
fn runners_target_generates_files() {
    let tempdir = project(&[
        ("unimake.toml", "test_files = [\"tests\"]\n"),
        (
            "tests/test_add.c",
            "#include \"unity_fixture.h\"\nTEST_GROUP(add);\nTEST(add, zero) {}\n",
        ),
    ]);

    Command::cargo_bin("unimake")
        .unwrap()
        .args(["runners", "--root"])
        .arg(tempdir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"));

    let runner =
        fs::read_to_string(tempdir.path().join("tests/runner/test_add_runner.c")).unwrap();
    assert!(runner.starts_with("/* AUTOGENERATED FILE. DO NOT EDIT. */\n"));
    assert!(runner.contains("RUN_TEST_CASE(add, zero);"));

    let aggregate =
        fs::read_to_string(tempdir.path().join("tests/runner/all_tests_runner.c")).unwrap();
    assert!(aggregate.contains("RUN_TEST_GROUP(add);"));
}

#[test]
fn clean_removes_the_build_tree() {
    let tempdir = project(&[("build/host/obj/stale.o", "")]);

    Command::cargo_bin("unimake")
        .unwrap()
        .args(["clean", "--root"])
        .arg(tempdir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    assert!(!tempdir.path().join("build/host").exists());
}

#[cfg(unix)]
#[test]
fn a_failing_compiler_propagates_its_exit_status() {
    let tempdir = project(&[
        (
            "unimake.toml",
            "sources = [\"src\"]\n\n[host]\ncc = [\"sh\", \"-c\", \"exit 7\"]\n",
        ),
        ("src/add.c", "int add(void) { return 0; }\n"),
    ]);

    Command::cargo_bin("unimake")
        .unwrap()
        .args(["build", "--root"])
        .arg(tempdir.path())
        .assert()
        .failure()
        .code(7)
        .stderr(predicate::str::contains("failed with exit code 7"));
}

#[test]
fn quiet_and_verbose_conflict() {
    Command::cargo_bin("unimake")
        .unwrap()
        .args(["--quiet", "--verbose"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incompatible"));
}
