use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AppError, CapturedOutput, Result};
use crate::orchestrator::marker::{extract_marker, MarkerScan};

/// One worker run: what to execute, where, for how long, and which marker
/// carries its result.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
    pub marker: String,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<PathBuf>, marker: &str, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout,
            marker: marker.to_string(),
        }
    }

    pub fn arg(mut self, a: impl Into<String>) -> Self {
        self.args.push(a.into());
        self
    }

    pub fn cwd(mut self, dir: Option<PathBuf>) -> Self {
        self.cwd = dir;
        self
    }

    pub fn env(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.envs.push((k.into(), v.into()));
        self
    }
}

async fn drain<R: AsyncRead + Unpin>(mut r: R, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = r.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Spawn the worker and return the JSON payload of its last marker line.
///
/// Outcome order: timeout, then marker payload, then non-zero exit, then a
/// clean exit without a marker. The payload is returned as-is; interpreting
/// `ok` is the caller's job.
pub async fn run_process(inv: &ProcessInvocation) -> Result<Value> {
    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &inv.cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in &inv.envs {
        cmd.env(k, v);
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| AppError::Invocation {
        exit_code: None,
        output: CapturedOutput {
            stdout: String::new(),
            stderr: format!("failed to spawn {}: {e}", inv.program.display()),
        },
    })?;
    debug!(program = %inv.program.display(), args = ?inv.args, pid = ?child.id(), "worker spawned");

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io(std::io::Error::other("worker stdout not piped")))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Io(std::io::Error::other("worker stderr not piped")))?;

    let mut out = Vec::new();
    let mut err = Vec::new();
    let waited = tokio::time::timeout(inv.timeout, async {
        let (status, o, e) = tokio::join!(child.wait(), drain(&mut stdout, &mut out), drain(&mut stderr, &mut err));
        o.and(e).and(status)
    })
    .await;

    let output = CapturedOutput {
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
    };

    let status = match waited {
        Err(_) => {
            // Reap before reporting; kill_on_drop covers the error path.
            let _ = child.start_kill();
            let _ = child.wait().await;
            warn!(
                program = %inv.program.display(),
                timeout_ms = inv.timeout.as_millis() as u64,
                "worker timed out and was killed"
            );
            return Err(AppError::Timeout { timeout_ms: inv.timeout.as_millis() as u64, output });
        }
        Ok(status) => status?,
    };
    debug!(
        exit_code = ?status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        stdout_bytes = output.stdout.len(),
        "worker exited"
    );

    match extract_marker(&output.stdout, &inv.marker) {
        MarkerScan::Payload(v) => Ok(v),
        scan => {
            if let MarkerScan::Malformed(e) = &scan {
                warn!(marker = %inv.marker, error = %e, "last marker line did not parse");
            }
            if status.success() {
                Err(AppError::PayloadMissing { marker: inv.marker.clone(), output })
            } else {
                Err(AppError::Invocation { exit_code: status.code(), output })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const M: &str = "__WINPROB_JSON__";

    fn sh(script: &str, timeout_ms: u64) -> ProcessInvocation {
        ProcessInvocation::new("sh", M, Duration::from_millis(timeout_ms))
            .arg("-c")
            .arg(script)
    }

    #[tokio::test]
    async fn payload_among_logs() {
        let inv = sh(&format!("echo starting; echo 'warn' >&2; echo '{M}{{\"ok\":true,\"p\":0.6}}'; echo bye"), 5_000);
        let v = run_process(&inv).await.unwrap();
        assert_eq!(v, json!({"ok": true, "p": 0.6}));
    }

    #[tokio::test]
    async fn marker_wins_over_nonzero_exit() {
        let inv = sh(&format!("echo '{M}{{\"ok\":false,\"error\":\"x\"}}'; exit 3"), 5_000);
        let v = run_process(&inv).await.unwrap();
        assert_eq!(v["ok"], false);
    }

    #[tokio::test]
    async fn timeout_beats_an_already_printed_marker() {
        let inv = sh(&format!("echo '{M}{{\"ok\":true}}'; sleep 5"), 300);
        let err = run_process(&inv).await.unwrap_err();
        match err {
            AppError::Timeout { timeout_ms, output } => {
                assert_eq!(timeout_ms, 300);
                assert!(output.stdout.contains(M));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_without_marker_is_invocation_failure() {
        let inv = sh("echo boom >&2; exit 7", 5_000);
        match run_process(&inv).await.unwrap_err() {
            AppError::Invocation { exit_code, output } => {
                assert_eq!(exit_code, Some(7));
                assert!(output.stderr.contains("boom"));
            }
            other => panic!("expected invocation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_exit_without_marker_is_payload_missing() {
        let inv = sh("echo just logs", 5_000);
        match run_process(&inv).await.unwrap_err() {
            AppError::PayloadMissing { marker, output } => {
                assert_eq!(marker, M);
                assert_eq!(output.stdout.trim(), "just logs");
            }
            other => panic!("expected payload missing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_marker_counts_as_missing() {
        let inv = sh(&format!("echo '{M}{{nope'"), 5_000);
        assert!(matches!(run_process(&inv).await.unwrap_err(), AppError::PayloadMissing { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_invocation_failure() {
        let inv = ProcessInvocation::new("/nonexistent/worker-binary", M, Duration::from_secs(1));
        assert!(matches!(
            run_process(&inv).await.unwrap_err(),
            AppError::Invocation { exit_code: None, .. }
        ));
    }

    /// Dead or reaped: a zombie still has a /proc entry, but in state `Z`.
    #[cfg(target_os = "linux")]
    fn is_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat.rsplit_once(')').is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_run_kills_the_worker() {
        let pidfile = std::env::temp_dir().join(format!("winprob-cancel-{}.pid", std::process::id()));
        let _ = std::fs::remove_file(&pidfile);
        let inv = sh(&format!("echo $$ > {}; exec sleep 30", pidfile.display()), 60_000);

        let mut run = Box::pin(run_process(&inv));
        let pid = loop {
            tokio::select! {
                res = &mut run => panic!("worker finished before it was cancelled: {res:?}"),
                _ = tokio::time::sleep(Duration::from_millis(20)) => {
                    let written = std::fs::read_to_string(&pidfile).unwrap_or_default();
                    if let Ok(pid) = written.trim().parse::<u32>() {
                        break pid;
                    }
                }
            }
        };
        assert!(!is_gone(pid), "worker {pid} should still be running");

        drop(run);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_gone(pid) {
            assert!(Instant::now() < deadline, "worker {pid} survived its cancelled run");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = std::fs::remove_file(&pidfile);
    }

    #[tokio::test]
    async fn env_and_cwd_reach_the_child() {
        let dir = std::env::temp_dir();
        let inv = sh(&format!("echo \"{M}{{\\\"v\\\":\\\"$WINPROB_TEST_VAR\\\"}}\"; pwd >&2"), 5_000)
            .env("WINPROB_TEST_VAR", "hello")
            .cwd(Some(dir));
        let v = run_process(&inv).await.unwrap();
        assert_eq!(v["v"], "hello");
    }
}
