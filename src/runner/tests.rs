use super::*;
use crate::agent::CredentialSpec;
use crate::credentials::collect;
use crate::template::params;
use std::thread;
use std::time::Instant;
use tempfile::TempDir;

fn ctx(temp_dir: &TempDir, env: &[(&str, &str)]) -> RunContext {
    let ambient = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RunContext::new(temp_dir.path(), temp_dir.path().join("logs"), ambient)
}

fn command(template: &str) -> AgentCommand {
    AgentCommand {
        agent_id: "test-agent".to_string(),
        invocation: Invocation::build(template, &params([("instruction", "hi")])).unwrap(),
        environment: BTreeMap::new(),
        base_env: Vec::new(),
        path_prefix: None,
        kill_grace: Duration::from_secs(1),
    }
}

#[test]
fn echoed_credentials_never_reach_the_log() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(
        &temp_dir,
        &[("PATH", "/usr/bin:/bin"), ("OPENAI_API_KEY", "sk-live-abc123")],
    );
    let forwarded = collect(&[CredentialSpec::optional("OPENAI_API_KEY")], &ctx.ambient_env).unwrap();

    let record = run(
        &command(r#"sh -c "echo key=$OPENAI_API_KEY; echo again $OPENAI_API_KEY >&2""#),
        &forwarded,
        &ctx,
    );

    assert!(record.is_success());
    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(!log.contains("sk-live-abc123"));
    assert!(log.contains("key=[REDACTED]"));
    assert!(log.contains("again [REDACTED]"));
}

#[test]
fn child_sees_only_base_env_and_forwarded_keys() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(
        &temp_dir,
        &[
            ("PATH", "/usr/bin:/bin"),
            ("AWS_SECRET_ACCESS_KEY", "aws"),
            ("GEMINI_API_KEY", "gem"),
        ],
    );
    let forwarded = collect(&[CredentialSpec::optional("GEMINI_API_KEY")], &ctx.ambient_env).unwrap();

    let mut cmd = command("env");
    cmd.environment.insert("AGENT_MODE".into(), "batch".into());
    let record = run(&cmd, &forwarded, &ctx);

    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.contains("GEMINI_API_KEY=[REDACTED]"));
    assert!(log.contains("AGENT_MODE=batch"));
    assert!(log.contains(&format!("HOME={}", ctx.home_dir().display())));
    assert!(!log.contains("AWS_SECRET_ACCESS_KEY"));
}

#[test]
fn path_prefix_is_searched_first() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join(".agent").join("test-agent").join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let script = bin.join("fake-agent");
    std::fs::write(&script, "#!/bin/sh\necho fake agent says $1\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let ctx = ctx(&temp_dir, &[("PATH", "/usr/bin:/bin")]);
    let mut cmd = command("fake-agent {instruction}");
    cmd.path_prefix = Some(bin);
    let record = run(&cmd, &ForwardedEnv::default(), &ctx);

    assert!(record.is_success(), "{:?}", record);
    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert_eq!(log, "fake agent says hi\n");
}

#[test]
fn non_zero_exit_is_recorded_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(&temp_dir, &[("PATH", "/usr/bin:/bin")]);
    let record = run(&command("sh -c 'exit 42'"), &ForwardedEnv::default(), &ctx);
    assert_eq!(record.kind, RecordKind::ProcessCrash);
    assert_eq!(record.exit_code, Some(42));
    assert!(!record.is_success());
}

#[test]
fn missing_binary_is_a_process_crash() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(&temp_dir, &[("PATH", "/usr/bin:/bin")]);
    let record = run(
        &command("definitely-not-installed-agent {instruction}"),
        &ForwardedEnv::default(),
        &ctx,
    );
    assert_eq!(record.kind, RecordKind::ProcessCrash);
    assert!(record.spawn_error.is_some());
    assert_eq!(record.exit_code, None);
}

#[test]
fn cancelling_in_flight_run_closes_the_log() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(&temp_dir, &[("PATH", "/usr/bin:/bin")]);
    let cancel = ctx.cancel.clone();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();
    });

    let started = Instant::now();
    let record = run(
        &command("sh -c 'echo working; sleep 30'"),
        &ForwardedEnv::default(),
        &ctx,
    );
    canceller.join().unwrap();

    assert_eq!(record.kind, RecordKind::Cancelled);
    assert_eq!(record.cancel_reason, Some(CancelReason::Aborted));
    assert!(started.elapsed() < Duration::from_secs(10));

    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.starts_with("working\n"));
    assert!(log.ends_with("(aborted)\n"));
}

#[test]
fn record_round_trips_through_json() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = ctx(&temp_dir, &[("PATH", "/usr/bin:/bin")]);
    let record = run(&command("echo {instruction}"), &ForwardedEnv::default(), &ctx);

    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("\"kind\":\"completed\""));
    assert!(!json.contains("cancel_reason"));
    let back: ExecutionRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}
