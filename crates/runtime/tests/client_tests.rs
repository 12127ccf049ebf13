//! End-to-end client calls against fake `claude` and `codex` executables.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

use envelope_runtime::cli_executor::{ClaudeCodeOptions, CodexOptions};
use envelope_runtime::language_model::{CallOptions, PromptMessage};
use envelope_runtime::{
    claude_code, codex, CliClient, CliClientExt, ErrorKind, GenerateStructuredArgs,
    GenerateTextArgs, LanguageModel, ToolClient,
};

/// Write an executable `sh` script; it records its argv one per line in
/// `args.txt` next to itself before running `body`.
fn fake_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\n: > '{args}'\nfor a in \"$@\"; do printf '%s\\n' \"$a\" >> '{args}'; done\n{body}\n",
        args = dir.join("args.txt").display(),
        body = body
    );
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn claude_client(dir: &TempDir, stdout: &str) -> ToolClient {
    let body = format!("cat <<'EOF'\n{}\nEOF", stdout);
    let exe = fake_cli(dir.path(), "claude", &body);
    ToolClient::claude_code(ClaudeCodeOptions {
        claude_path: Some(exe.display().to_string()),
        cwd: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
}

/// Codex stand-in: writes `message` to the `--output-last-message` path and
/// copies the `--output-schema` file to `schema_seen.json`.
fn codex_client(dir: &TempDir, message: &str) -> ToolClient {
    let body = format!(
        r#"out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--output-last-message" ]; then out="$a"; fi
  if [ "$prev" = "--output-schema" ]; then cp "$a" '{seen}'; fi
  prev="$a"
done
cat > "$out" <<'EOF'
{message}
EOF"#,
        seen = dir.path().join("schema_seen.json").display(),
        message = message
    );
    let exe = fake_cli(dir.path(), "codex", &body);
    ToolClient::codex(CodexOptions {
        codex_path: Some(exe.display().to_string()),
        cwd: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
}

#[derive(Debug, Deserialize, PartialEq)]
struct Answer {
    answer: u32,
}

#[tokio::test]
#[serial]
async fn test_claude_text_from_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let client = claude_client(&dir, r#"{"type":"result","result":"hello world"}"#);

    let response = client.text(GenerateTextArgs::new("say hi")).await.unwrap();
    assert_eq!(response.text, "hello world");

    let args = recorded_args(dir.path());
    assert_eq!(
        args,
        vec![
            "--model",
            "opus",
            "-p",
            "--permission-mode",
            "dontAsk",
            "--tools",
            "",
            "--max-budget-usd",
            "5",
            "--output-format",
            "json",
            "say hi"
        ]
    );
}

#[tokio::test]
#[serial]
async fn test_claude_text_raw_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let client = claude_client(&dir, "plain text response");
    let response = client.text(GenerateTextArgs::new("hi")).await.unwrap();
    assert_eq!(response.text, "plain text response\n");
}

#[tokio::test]
#[serial]
async fn test_claude_structured_success() {
    let dir = tempfile::tempdir().unwrap();
    let client = claude_client(
        &dir,
        r#"{"result":"done","structured_output":{"answer":42},"total_cost_usd":0.013}"#,
    );

    let schema = json!({"type":"object","properties":{"answer":{"type":"integer"}}});
    let response = client
        .structured::<Answer>(GenerateStructuredArgs::new("what is it?", schema.clone()))
        .await
        .unwrap();
    assert_eq!(response.structured, Answer { answer: 42 });

    let args = recorded_args(dir.path());
    let n = args.len();
    assert_eq!(args[n - 3], "--json-schema");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&args[n - 2]).unwrap(),
        schema
    );
    assert_eq!(args[n - 1], "what is it?");
}

#[tokio::test]
#[serial]
async fn test_claude_structured_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let client = claude_client(&dir, r#"{"is_error":true,"subtype":"rate_limit"}"#);
    let err = client
        .structured_value(GenerateStructuredArgs::new("q", json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rate_limit"));
    assert_eq!(err.kind(), ErrorKind::BackendErrorEnvelope);
}

#[tokio::test]
#[serial]
async fn test_claude_structured_non_json() {
    let dir = tempfile::tempdir().unwrap();
    let client = claude_client(&dir, "not json at all");
    let err = client
        .structured_value(GenerateStructuredArgs::new("q", json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("non-JSON output"));
    assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);
}

#[tokio::test]
#[serial]
async fn test_claude_full_envelope_via_cli_api() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_cli(
        dir.path(),
        "claude",
        r#"echo '{"structured_output":{"answer":1},"total_cost_usd":0.5,"session_id":"s-1"}'"#,
    );
    let options = ClaudeCodeOptions {
        claude_path: Some(exe.display().to_string()),
        system_prompt: Some("be terse".into()),
        allowed_tools: vec!["Read".into(), "Grep".into()],
        ..Default::default()
    };

    let envelope = claude_code::structured("q", &json!({}), &options).await.unwrap();
    assert_eq!(envelope.total_cost_usd, Some(0.5));
    assert_eq!(envelope.session_id.as_deref(), Some("s-1"));

    let args = recorded_args(dir.path());
    assert_eq!(args.iter().filter(|a| *a == "--allowedTools").count(), 2);
    assert!(args.contains(&"be terse".to_string()));
    assert!(!args.contains(&"--fallback-model".to_string()));
}

#[tokio::test]
#[serial]
async fn test_claude_non_zero_exit_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let body = format!(
        "echo x >> '{}'\necho 'Error: invalid model' >&2\nexit 2",
        counter.display()
    );
    let exe = fake_cli(dir.path(), "claude", &body);
    let client = ToolClient::claude_code(ClaudeCodeOptions {
        claude_path: Some(exe.display().to_string()),
        retries: Some(1),
        ..Default::default()
    });

    let err = client.text(GenerateTextArgs::new("hi")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonZeroExit);
    assert!(err.to_string().starts_with("claude CLI failed"));
    assert!(err.to_string().contains("invalid model"));
    assert_eq!(
        std::fs::read_to_string(&counter).unwrap().lines().count(),
        1
    );
}

#[tokio::test]
#[serial]
async fn test_claude_retries_after_graceful_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let body = format!(
        "echo x >> '{c}'\nif [ $(wc -l < '{c}') -lt 2 ]; then sleep 10; fi\necho '{{\"result\":\"second time lucky\"}}'",
        c = counter.display()
    );
    let exe = fake_cli(dir.path(), "claude", &body);
    let client = ToolClient::claude_code(ClaudeCodeOptions {
        claude_path: Some(exe.display().to_string()),
        timeout: Some(Duration::from_millis(500)),
        retries: Some(1),
        retry_delay: Some(Duration::from_millis(10)),
        ..Default::default()
    });

    let response = client.text(GenerateTextArgs::new("hi")).await.unwrap();
    assert_eq!(response.text, "second time lucky");
    assert_eq!(
        std::fs::read_to_string(&counter).unwrap().lines().count(),
        2
    );
}

#[tokio::test]
#[serial]
async fn test_missing_executable_is_spawn_failure() {
    let client = ToolClient::claude_code(ClaudeCodeOptions {
        claude_path: Some("/nonexistent/claude-envelope-test".into()),
        ..Default::default()
    });
    let err = client.text(GenerateTextArgs::new("hi")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpawnFailed);
}

#[tokio::test]
#[serial]
async fn test_env_is_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_cli(
        dir.path(),
        "claude",
        r#"printf '{"result":"%s"}' "$ENVELOPE_FAKE_SECRET""#,
    );
    let mut env = std::collections::BTreeMap::new();
    env.insert("ENVELOPE_FAKE_SECRET".to_string(), "s3cret".to_string());
    env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    let client = ToolClient::claude_code(ClaudeCodeOptions {
        claude_path: Some(exe.display().to_string()),
        env: Some(env),
        ..Default::default()
    });

    let response = client.text(GenerateTextArgs::new("hi")).await.unwrap();
    assert_eq!(response.text, "s3cret");
}

#[tokio::test]
#[serial]
async fn test_codex_text_reads_last_message() {
    let dir = tempfile::tempdir().unwrap();
    let client = codex_client(&dir, "Refactored 3 files.");

    let response = client.text(GenerateTextArgs::new("refactor")).await.unwrap();
    assert_eq!(response.text, "Refactored 3 files.\n");

    let args = recorded_args(dir.path());
    assert_eq!(args[0], "exec");
    assert_eq!(args[1], "--skip-git-repo-check");
    assert!(!args.contains(&"--output-schema".to_string()));
    let out = &args[args.len() - 2];
    assert!(out.ends_with("last.txt"));
    // Scratch directory is removed after the call
    assert!(!Path::new(out).exists());
    assert_eq!(args.last().unwrap(), "refactor");
}

#[tokio::test]
#[serial]
async fn test_codex_structured_uses_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let client = codex_client(&dir, r#"{"answer":7}"#);
    let schema = json!({"type":"object","required":["answer"]});

    let response = client
        .structured::<Answer>(GenerateStructuredArgs::new("count", schema.clone()))
        .await
        .unwrap();
    assert_eq!(response.structured, Answer { answer: 7 });

    let seen = std::fs::read_to_string(dir.path().join("schema_seen.json")).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&seen).unwrap(), schema);
}

#[tokio::test]
#[serial]
async fn test_codex_structured_non_json_message() {
    let dir = tempfile::tempdir().unwrap();
    let client = codex_client(&dir, "I could not produce JSON");
    let err = client
        .structured_value(GenerateStructuredArgs::new("q", json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("codex CLI returned non-JSON output"));
}

#[tokio::test]
#[serial]
async fn test_codex_cli_api_returns_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let client = codex_client(&dir, r#"{"answer":1}"#);
    let options = CodexOptions {
        codex_path: Some(match client.backend() {
            envelope_runtime::Backend::Codex(o) => o.codex_path.clone(),
            _ => unreachable!(),
        }),
        ..Default::default()
    };

    let out = codex::structured("q", &json!({}), &options).await.unwrap();
    assert_eq!(out.structured, json!({"answer": 1}));
    assert_eq!(out.raw, "{\"answer\":1}\n");
}

#[tokio::test]
#[serial]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_cli(dir.path(), "codex", "echo 'codex-cli 0.98.0'");
    let client = ToolClient::codex(CodexOptions {
        codex_path: Some(exe.display().to_string()),
        ..Default::default()
    });
    assert_eq!(client.health_check().await.unwrap(), "codex-cli 0.98.0");
    assert_eq!(recorded_args(dir.path()), vec!["--version"]);
}

#[tokio::test]
#[serial]
async fn test_model_adapter_object_json_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_cli(
        dir.path(),
        "claude",
        r#"echo '{"structured_output":{"answer":42}}'"#,
    );
    let model = envelope_runtime::language_model::claude_code(
        "sonnet",
        ClaudeCodeOptions {
            claude_path: Some(exe.display().to_string()),
            ..Default::default()
        },
    );

    let result = model
        .do_generate(CallOptions::object_json(
            vec![
                PromptMessage::system("Answer with JSON."),
                PromptMessage::user("What is six times seven?"),
            ],
            json!({"type":"object"}),
        ))
        .await
        .unwrap();
    assert_eq!(result.text, r#"{"answer":42}"#);

    let args = recorded_args(dir.path());
    let idx = args.iter().position(|a| a == "--model").unwrap();
    assert_eq!(args[idx + 1], "sonnet");
    // Flattened transcript spans two lines, so it is recorded as two entries
    assert_eq!(
        &args[args.len() - 2..],
        &["system: Answer with JSON.", "user: What is six times seven?"]
    );
}
