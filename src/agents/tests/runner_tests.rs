use super::*;

#[test]
fn test_runner_config_defaults() {
    let config = RunnerConfig::new("test".to_string(), PathBuf::from("."));
    assert_eq!(config.overall_timeout, DEFAULT_OVERALL_TIMEOUT);
    assert_eq!(config.capture_limit, DEFAULT_CAPTURE_LIMIT);
}

#[test]
fn test_runner_config_custom_timeout() {
    let config = RunnerConfig::new("test".to_string(), PathBuf::from("."))
        .with_overall_timeout(Duration::from_secs(600));
    assert_eq!(config.overall_timeout, Duration::from_secs(600));
}

#[test]
fn test_process_output_success() {
    let output = ProcessOutput {
        return_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    };
    assert!(output.success());
    assert!(!ProcessOutput {
        return_code: None,
        ..output
    }
    .success());
}

#[tokio::test]
async fn test_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig::new("missing".to_string(), dir.path().to_path_buf());

    let err = run_process(Command::new("/nonexistent/agent-binary"), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Spawn { .. }));
}

#[tokio::test]
async fn test_read_capped_keeps_prefix() {
    let data = vec![b'a'; 3 * READ_CHUNK_SIZE + 17];
    let captured = read_capped(Some(data.as_slice()), 100).await.unwrap();
    assert_eq!(captured, "a".repeat(100));

    let captured = read_capped(Some(&b"short"[..]), 100).await.unwrap();
    assert_eq!(captured, "short");
    assert_eq!(read_capped(None::<&[u8]>, 100).await.unwrap(), "");
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn sh(script: &Path) -> Command {
        let mut command = Command::new("/bin/sh");
        command.arg(script);
        command
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "agent.sh", "echo out; echo err >&2; pwd; exit 3");
        let config = RunnerConfig::new("agent".to_string(), dir.path().to_path_buf());

        let output = run_process(sh(&script), &config).await.unwrap();
        assert_eq!(output.return_code, Some(3));
        assert!(!output.success());
        assert!(output.stdout.starts_with("out\n"));
        assert_eq!(output.stderr, "err\n");

        let pwd = output.stdout.lines().nth(1).unwrap();
        assert_eq!(
            Path::new(pwd).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_passes_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "args.sh", "for a in \"$@\"; do echo \"$a\"; done");
        let config = RunnerConfig::new("agent".to_string(), dir.path().to_path_buf());

        let mut command = sh(&script);
        command.args(["--print", "hello world"]);
        let output = run_process(command, &config).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "--print\nhello world\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "slow.sh", "sleep 30");
        let config = RunnerConfig::new("slow".to_string(), dir.path().to_path_buf())
            .with_overall_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = run_process(sh(&script), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_large_output_is_capped_and_drained() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "chatty.sh",
            "i=0; while [ $i -lt 2000 ]; do echo 0123456789012345678901234567890123456789; i=$((i+1)); done; echo done >&2",
        );
        let config = RunnerConfig::new("chatty".to_string(), dir.path().to_path_buf())
            .with_capture_limit(4096)
            .with_overall_timeout(Duration::from_secs(30));

        let output = run_process(sh(&script), &config).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.len(), 4096);
        assert!(output.stdout.starts_with("0123456789"));
        assert_eq!(output.stderr, "done\n");
    }
}
