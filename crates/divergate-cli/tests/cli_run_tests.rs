//! End-to-end runs against stub tool binaries.

#![cfg(unix)]

mod util;

use predicates::prelude::*;
use serde_json::json;
use util::Sandbox;

#[test]
fn agreeing_variants_pass() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app("echo hello", json!({}))
        .assert()
        .success()
        .stdout(predicate::str::contains("Running test \"App\""))
        .stdout(predicate::str::contains(
            "Total tests: 1, passed: 1, failed (expected): 0, failed: 0",
        ));
}

#[test]
fn diverging_variants_fail_with_diagnostics() {
    let sandbox = Sandbox::new();
    // Printing the argv makes every variant's output differ.
    sandbox
        .packaged_app("echo \"$@\"", json!({}))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Test \"App\" failed:"))
        .stdout(predicate::str::contains("regular result:"))
        .stdout(predicate::str::contains("agent result:"))
        .stdout(predicate::str::contains("Failed tests:"));
}

#[test]
fn failure_expected_tolerates_divergence() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            "echo \"$@\"",
            json!({
                "jar_tests": [{ "name": "App", "jar_file": "app.jar", "failure_expected": true }]
            }),
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("failed (expected): 1"))
        .stdout(predicate::str::contains("Failed tests:").not());
}

#[test]
fn failure_expected_flags_agreement_for_review() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            "echo hello",
            json!({
                "jar_tests": [{ "name": "App", "jar_file": "app.jar", "failure_expected": true }]
            }),
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("Passed unexpectedly"))
        .stdout(predicate::str::contains("App"));
}

#[test]
fn exit_code_counts_unexpected_failures() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            "echo \"$@\"",
            json!({
                "jar_tests": [
                    { "name": "First", "jar_file": "app.jar" },
                    { "name": "Second", "jar_file": "app.jar" },
                    { "name": "Tolerated", "jar_file": "app.jar", "failure_expected": true }
                ]
            }),
        )
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Total tests: 3"));
}

#[test]
fn agent_banner_is_normalized_away_by_configured_filters() {
    let noisy = r#"case "$*" in *-javaagent*) echo "instrumentation ready";; esac
echo hello"#;

    // Without filters the extra banner line is a divergence.
    let sandbox = Sandbox::new();
    sandbox.packaged_app(noisy, json!({})).assert().code(1);

    // The configured literal strips it before comparison.
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            noisy,
            json!({
                "output_filters": { "strip_lines": ["instrumentation ready"] }
            }),
        )
        .assert()
        .success();
}

#[test]
fn warning_pattern_filter_applies_to_all_variants() {
    let noisy = r#"echo "WARNING: dynamic loading ($*)" >&2
echo hello"#;
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            noisy,
            json!({
                "output_filters": { "strip_patterns": ["^WARNING: "] }
            }),
        )
        .assert()
        .success();
}

#[test]
fn declared_input_file_is_piped_to_every_variant() {
    let sandbox = Sandbox::new();
    sandbox.add_fixture("jars/inputs/lines.txt", b"alpha\nbeta\n");
    sandbox
        .packaged_app(
            "cat",
            json!({
                "jar_tests": [
                    { "name": "App", "jar_file": "app.jar", "input_file": "lines.txt" }
                ]
            }),
        )
        .arg("--verbose")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"));
}

#[test]
fn safe_mode_classifies_like_concurrent_mode() {
    let sandbox = Sandbox::new();
    sandbox.packaged_app("echo hello", json!({})).assert().success();

    let sandbox = Sandbox::new();
    sandbox
        .packaged_app("echo hello", json!({}))
        .arg("--safe")
        .assert()
        .success()
        .stdout(predicate::str::contains("passed: 1"));
}

#[test]
fn per_test_safe_flag_is_accepted() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app(
            "echo hello",
            json!({
                "jar_tests": [{ "name": "App", "jar_file": "app.jar", "safe": true }]
            }),
        )
        .assert()
        .success();
}

#[test]
fn verbose_prints_results_for_passing_tests_too() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app("echo hello", json!({}))
        .arg("--verbose")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test \"App\" (passed):"));
}

#[test]
fn unlaunchable_tool_counts_as_unexpected_failure() {
    let sandbox = Sandbox::new();
    let javac = sandbox.stub_javac();
    sandbox.add_artifacts();
    sandbox.add_fixture("jars/app.jar", b"jar");

    let mut config = sandbox.base_config(std::path::Path::new("/no/such/java"), &javac);
    util::merge(
        &mut config,
        json!({ "jar_tests": [{ "name": "App", "jar_file": "app.jar" }] }),
    );
    sandbox.write_config(&config);

    sandbox
        .command()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed to launch"))
        .stdout(predicate::str::contains("Failed tests:"));
}

#[test]
fn single_file_test_compiles_then_compares() {
    let sandbox = Sandbox::new();
    let java = sandbox.write_script("java", "echo compiled-output");
    let javac = sandbox.stub_javac();
    sandbox.add_artifacts();
    sandbox.add_fixture("src/Hello.java", b"class Hello {}");

    let mut config = sandbox.base_config(&java, &javac);
    util::merge(
        &mut config,
        json!({ "single_file_tests": [{ "name": "Hello", "source": "Hello.java" }] }),
    );
    sandbox.write_config(&config);

    sandbox
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Running test \"Hello\""))
        .stdout(predicate::str::contains("passed: 1"));
}

#[test]
fn hung_variants_time_out_and_fail() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app("sleep 5\necho hello", json!({}))
        .arg("--timeout")
        .arg("200ms")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("timed out"));
}

#[test]
fn two_variant_runs_skip_the_instrumentation_pre_step() {
    let sandbox = Sandbox::new();
    // A stub that fails loudly if asked to instrument (-f marks the pre-step).
    let body = r#"case "$*" in *" -f "*) echo "unexpected instrument call" >&2; exit 9;; esac
echo hello"#;
    sandbox
        .packaged_app(body, json!({ "variants": ["regular", "agent"] }))
        .assert()
        .success();
}

#[test]
fn report_out_writes_a_versioned_receipt() {
    let sandbox = Sandbox::new();
    let out = sandbox.root().join("out/receipt.json");
    sandbox
        .packaged_app(
            "echo \"$@\"",
            json!({
                "jar_tests": [
                    { "name": "Good", "jar_file": "app.jar", "failure_expected": true },
                    { "name": "Bad", "jar_file": "app.jar" }
                ]
            }),
        )
        .arg("--report-out")
        .arg(&out)
        .assert()
        .code(1);

    let receipt: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(receipt["schema"], "divergate.run.v1");
    assert_eq!(receipt["tool"]["name"], "divergate");
    assert_eq!(receipt["summary"]["total"], 2);
    assert_eq!(receipt["summary"]["failed_unexpectedly"], 1);
    assert_eq!(receipt["summary"]["failed_expectedly"], 1);
    assert!(!receipt["run"]["id"].as_str().unwrap().is_empty());

    let tests = receipt["tests"].as_array().unwrap();
    assert_eq!(tests[0]["name"], "Good");
    assert_eq!(tests[0]["bucket"], "failed_expectedly");
    assert_eq!(tests[1]["bucket"], "failed_unexpectedly");
    let variants = tests[1]["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 3);
    assert_eq!(variants[0]["status"], "completed");
}

#[test]
fn empty_suite_reports_zero_and_exits_clean() {
    let sandbox = Sandbox::new();
    sandbox
        .packaged_app("echo hello", json!({ "jar_tests": [] }))
        .assert()
        .success()
        .stdout(predicate::str::contains("Total tests: 0"));
}
