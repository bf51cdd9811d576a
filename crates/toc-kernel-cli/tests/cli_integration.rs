use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::JSONSchema;
use serde_json::{json, Value};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_tockit<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_tockit"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute tockit binary: {err}"))
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not valid JSON: {err}\nstdout:\n{stdout}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_tockit(args);
    if !output.status.success() {
        panic!(
            "tockit command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    stdout_json(&output)
}

fn run_json_failing<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_tockit(args);
    assert!(
        !output.status.success(),
        "expected non-zero exit, stdout:\n{}",
        String::from_utf8_lossy(&output.stdout)
    );
    stdout_json(&output)
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()))
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(value)
        .unwrap_or_else(|err| panic!("failed to serialize {name}: {err}"));
    fs::write(&path, body).unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
    path
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

fn node_ids(rows: &[Value]) -> Vec<&str> {
    rows.iter().map(|row| as_str(row, "node_id")).collect()
}

fn passing_graph() -> Value {
    json!({
        "nodes": [
            {"id": "g1", "node_type": "GOAL", "title": "Literacy"},
            {"id": "o1", "node_type": "OUTCOME", "primary_parent_id": "g1"},
            {"id": "p1", "node_type": "OUTPUT", "primary_parent_id": "o1"},
            {"id": "a1", "node_type": "ACTIVITY", "primary_parent_id": "p1"}
        ],
        "edges": [
            {"id": "e1", "source_node_id": "g1", "target_node_id": "o1",
             "edge_kind": "CAUSAL", "mechanism": "funding enables delivery"}
        ],
        "rlsBaselineOk": true
    })
}

fn ghost_graph() -> Value {
    json!({
        "nodes": [
            {"id": "g1", "node_type": "GOAL", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "o1", "node_type": "OUTCOME", "primary_parent_id": "g1", "created_at": "2024-01-02T00:00:00Z"},
            {"id": "o2", "node_type": "OUTCOME", "primary_parent_id": "g1", "created_at": "2024-01-03T00:00:00Z"},
            {"id": "p1", "node_type": "OUTPUT", "primary_parent_id": "o1", "created_at": "2024-01-04T00:00:00Z"}
        ],
        "edges": [
            {"id": "s1", "source_node_id": "o2", "target_node_id": "p1", "edge_kind": "SECONDARY_LINK"}
        ]
    })
}

// Test IDs: TCLI-001
#[test]
fn validate_passing_graph_exits_zero_with_contract_version() {
    let dir = unique_temp_dir("tockit-validate-pass");
    let graph = write_json(&dir, "graph.json", &passing_graph());

    let report = run_json([OsStr::new("validate"), OsStr::new("--in"), graph.as_os_str()]);
    validate_schema("gate_report.schema.json", &report);
    assert_eq!(report["pass"], json!(true));
    assert!(as_array(&report, "violations").is_empty());
    assert_eq!(as_str(&report, "contract_version"), "tockit.v1");
    assert_eq!(as_str(&report, "api_contract_version"), "toc-api.v1");
}

// Test IDs: TCLI-002
#[test]
fn validate_failing_graph_exits_non_zero_with_ordered_violations() {
    let dir = unique_temp_dir("tockit-validate-fail");
    let graph = write_json(
        &dir,
        "graph.json",
        &json!({
            "nodes": [
                {"id": "g2", "node_type": "GOAL"},
                {"id": "g1", "node_type": "GOAL"},
                {"id": "o1", "node_type": "OUTCOME", "primary_parent_id": "g1"}
            ],
            "edges": [
                {"id": "e2", "source_node_id": "o1", "target_node_id": "g1",
                 "edge_kind": "CAUSAL", "mechanism": "feedback pressure"},
                {"id": "e1", "source_node_id": "g1", "target_node_id": "o1",
                 "edge_kind": "CAUSAL", "mechanism": "funding enables delivery"}
            ],
            "rlsBaselineOk": true
        }),
    );

    let report = run_json_failing([OsStr::new("validate"), OsStr::new("--in"), graph.as_os_str()]);
    validate_schema("gate_report.schema.json", &report);
    assert_eq!(report["pass"], json!(false));
    let violations = as_array(&report, "violations");
    let summary: Vec<(&str, &str, Value)> = violations
        .iter()
        .map(|violation| {
            (as_str(violation, "rule_id"), as_str(violation, "error_code"), violation["entity_refs"].clone())
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("GA-01", "GA_ERR_GOAL_COUNT", json!(["g1", "g2"])),
            ("GA-04", "GA_ERR_CAUSAL_CYCLE", json!(["g1", "o1"])),
        ]
    );
}

// Test IDs: TCLI-003
#[test]
fn strict_rls_flag_and_config_file_fail_omitted_baseline() {
    let dir = unique_temp_dir("tockit-validate-rls");
    let mut payload = passing_graph();
    if let Some(object) = payload.as_object_mut() {
        object.remove("rlsBaselineOk");
    }
    let graph = write_json(&dir, "graph.json", &payload);

    let lenient = run_json([OsStr::new("validate"), OsStr::new("--in"), graph.as_os_str()]);
    assert_eq!(lenient["pass"], json!(true));

    let strict = run_json_failing([
        OsStr::new("--strict-rls"),
        OsStr::new("validate"),
        OsStr::new("--in"),
        graph.as_os_str(),
    ]);
    let violations = as_array(&strict, "violations");
    assert_eq!(violations.len(), 1);
    assert_eq!(as_str(&violations[0], "error_code"), "GA_ERR_RLS_BASELINE");
    assert_eq!(violations[0]["entity_refs"], json!(["rls_baseline=false"]));

    let config = dir.join("gate.yaml");
    fs::write(&config, "missing_rls_baseline: fail_closed\n")
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", config.display()));
    let from_config = run_json_failing([
        OsStr::new("validate"),
        OsStr::new("--config"),
        config.as_os_str(),
        OsStr::new("--in"),
        graph.as_os_str(),
    ]);
    assert_eq!(from_config["violations"], strict["violations"]);
}

// Test IDs: TCLI-004
#[test]
fn project_emits_ordered_rows_and_stable_fingerprint() {
    let dir = unique_temp_dir("tockit-project");
    let forward = write_json(&dir, "forward.json", &ghost_graph());
    let mut reversed = ghost_graph();
    if let Some(nodes) = reversed.get_mut("nodes").and_then(Value::as_array_mut) {
        nodes.reverse();
    }
    let reversed = write_json(&dir, "reversed.json", &reversed);

    let projection = run_json([OsStr::new("project"), OsStr::new("--in"), forward.as_os_str()]);
    validate_schema("projection.schema.json", &projection);
    let rows = as_array(&projection, "rows");
    assert_eq!(rows.len(), 5);
    assert_eq!(node_ids(rows), vec!["g1", "o1", "p1", "o2", "p1"]);

    let ghosts: Vec<&Value> = rows.iter().filter(|row| row["is_ghost"] == json!(true)).collect();
    assert_eq!(ghosts.len(), 1);
    assert_eq!(as_str(ghosts[0], "row_kind"), "ghost_secondary");
    assert_eq!(as_str(ghosts[0], "projection_parent_id"), "o2");
    assert_eq!(as_str(ghosts[0], "source_edge_id"), "s1");
    assert_eq!(ghosts[0]["path_key"], json!(["g1", "o2", "p1"]));
    assert_eq!(ghosts[0]["primary_path_key"], json!(["g1", "o1", "p1"]));

    let again = run_json([OsStr::new("project"), OsStr::new("--in"), reversed.as_os_str()]);
    assert_eq!(again["rows"], projection["rows"]);
    assert_eq!(as_str(&again, "fingerprint"), as_str(&projection, "fingerprint"));
}

// Test IDs: TCLI-005
#[test]
fn matrix_reads_published_rows_and_matches_builder_fingerprint() {
    let dir = unique_temp_dir("tockit-matrix");
    let graph = write_json(&dir, "graph.json", &ghost_graph());
    let projection = run_json([OsStr::new("project"), OsStr::new("--in"), graph.as_os_str()]);

    let mut persisted = as_array(&projection, "rows").clone();
    persisted.reverse();
    let rows = write_json(&dir, "rows.json", &Value::Array(persisted));
    let published = write_json(&dir, "published.json", &json!({"id": "ver-1", "status": "PUBLISHED"}));
    let draft = write_json(&dir, "draft.json", &json!({"id": "ver-2", "status": "DRAFT"}));

    let envelope = run_json([
        OsStr::new("matrix"),
        OsStr::new("--version"),
        published.as_os_str(),
        OsStr::new("--rows"),
        rows.as_os_str(),
    ]);
    validate_schema("envelope.schema.json", &envelope);
    assert_eq!(envelope["ok"], json!(true));
    assert_eq!(envelope["data"]["rows"], projection["rows"]);
    assert_eq!(envelope["data"]["fingerprint"], projection["fingerprint"]);

    let not_found = run_json_failing([
        OsStr::new("matrix"),
        OsStr::new("--version"),
        draft.as_os_str(),
        OsStr::new("--rows"),
        rows.as_os_str(),
    ]);
    validate_schema("envelope.schema.json", &not_found);
    assert_eq!(as_str(&not_found, "code"), "NOT_FOUND");
    assert_eq!(as_str(&not_found, "message"), "Published ToC version not found");
}

// Test IDs: TCLI-006
#[test]
fn publish_commits_only_when_gate_passes() {
    let dir = unique_temp_dir("tockit-publish");
    let mut draft_payload = passing_graph();
    if let Some(object) = draft_payload.as_object_mut() {
        object.insert("found".to_string(), json!(true));
    }
    let draft = write_json(&dir, "draft.json", &draft_payload);
    let commit = write_json(&dir, "commit.json", &json!({"ok": true, "data": {"version_id": "ver-9"}}));

    let published = run_json([
        OsStr::new("publish"),
        OsStr::new("--draft"),
        draft.as_os_str(),
        OsStr::new("--commit"),
        commit.as_os_str(),
    ]);
    validate_schema("envelope.schema.json", &published);
    assert_eq!(published["ok"], json!(true));
    assert_eq!(published["data"], json!({"version_id": "ver-9"}));

    if let Some(edges) = draft_payload.get_mut("edges").and_then(Value::as_array_mut) {
        edges[0]["mechanism"] = json!("");
    }
    let failing = write_json(&dir, "failing.json", &draft_payload);
    let blocked = run_json_failing([
        OsStr::new("publish"),
        OsStr::new("--draft"),
        failing.as_os_str(),
        OsStr::new("--commit"),
        commit.as_os_str(),
    ]);
    validate_schema("envelope.schema.json", &blocked);
    assert_eq!(as_str(&blocked, "code"), "GA_VALIDATION_FAILED");
    assert_eq!(as_str(&blocked, "message"), "Gate A validation failed");
    assert_eq!(as_str(&as_array(&blocked, "violations")[0], "rule_id"), "GA-06");

    let missing = write_json(&dir, "missing.json", &json!({"found": false}));
    let not_found = run_json_failing([
        OsStr::new("publish"),
        OsStr::new("--draft"),
        missing.as_os_str(),
        OsStr::new("--commit"),
        commit.as_os_str(),
    ]);
    assert_eq!(as_str(&not_found, "code"), "NOT_FOUND");
    assert_eq!(as_str(&not_found, "message"), "Draft not found");
}

// Test IDs: TCLI-007
#[test]
fn unreadable_input_reports_path_on_stderr() {
    let dir = unique_temp_dir("tockit-missing-input");
    let absent = dir.join("absent.json");

    let output = run_tockit([OsStr::new("validate"), OsStr::new("--in"), absent.as_os_str()]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read graph payload"), "stderr:\n{stderr}");
}
