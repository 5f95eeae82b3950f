//! Runs the `entity-mirror` binary and checks what lands on stdout and stderr.

use std::process::{Command, Output};

use serde_json::Value;

fn entity_mirror(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_entity-mirror"))
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env_remove("RUST_LOG")
        .env_remove("ENTITY_MIRROR_CONFIG")
        .output()
        .expect("failed to run entity-mirror")
}

#[test]
fn test_json_output_is_not_mixed_with_logs() {
    let output = entity_mirror(&["--log-level", "info", "--format", "json", "categories"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let rows: Value = serde_json::from_str(&stdout).expect("stdout should be one JSON document");
    assert_eq!(rows.as_array().map(Vec::len), Some(9));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Injected mirror listener"));
    assert!(stderr.contains("Removed mirror listeners"));
}

#[test]
fn test_demo_json_output_parses() {
    let output = entity_mirror(&["--log-level", "debug", "--format", "json", "demo"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut documents = serde_json::Deserializer::from_str(&stdout).into_iter::<Value>();
    let calls = documents.next().unwrap().unwrap();
    let groups = documents.next().unwrap().unwrap();
    assert!(documents.next().is_none());
    assert!(calls.as_array().is_some_and(|c| !c.is_empty()));
    assert_eq!(groups.as_array().map(Vec::len), Some(9));
}
