pub mod marker;
pub mod process;
pub mod task;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::api::health::HealthState;
use crate::compute::{compute_probability, ComputeRequest};
use crate::config::{Config, Isolation, MATCHID_MARKER, WINPROB_MARKER};
use crate::error::{AppError, ErrorKind, Result};
use crate::faceit::{FaceitApi, HttpFaceitApi};
use crate::resolver::resolve_match;
use crate::types::{ActiveMatchReport, ProbabilityOutcome};

pub use process::{run_process, ProcessInvocation};
pub use task::run_supervised;

#[derive(Clone)]
enum Backend {
    Process,
    Task(Arc<dyn FaceitApi>),
}

/// Runs resolve and compute jobs in isolation, one worker per request.
#[derive(Clone)]
pub struct Orchestrator {
    cfg: Arc<Config>,
    health: Arc<HealthState>,
    backend: Backend,
}

impl Orchestrator {
    pub fn from_config(cfg: Arc<Config>, health: Arc<HealthState>) -> Result<Self> {
        match cfg.isolation {
            Isolation::Process => Ok(Self { cfg, health, backend: Backend::Process }),
            Isolation::Task => {
                let api = Arc::new(HttpFaceitApi::new(&cfg)?);
                Ok(Self::with_api(cfg, health, api))
            }
        }
    }

    /// Task isolation over a caller-supplied upstream.
    pub fn with_api(cfg: Arc<Config>, health: Arc<HealthState>, api: Arc<dyn FaceitApi>) -> Self {
        Self { cfg, health, backend: Backend::Task(api) }
    }

    pub fn isolation(&self) -> Isolation {
        match self.backend {
            Backend::Process => Isolation::Process,
            Backend::Task(_) => Isolation::Task,
        }
    }

    pub async fn resolve(&self, nickname: &str) -> Result<ActiveMatchReport> {
        let _in_flight = self.health.worker_started();
        let result = match &self.backend {
            Backend::Process => {
                let inv = self
                    .invocation(MATCHID_MARKER, self.cfg.resolve_worker_timeout)
                    .arg("resolve")
                    .arg("--")
                    .arg(nickname);
                run_process(&inv).await.and_then(decode_payload)
            }
            Backend::Task(api) => {
                let api = api.clone();
                let nickname = nickname.to_string();
                let budget = self.cfg.resolve_budget;
                run_supervised("resolve", self.cfg.resolve_worker_timeout, async move {
                    resolve_match(api.as_ref(), &nickname, budget).await.map(ActiveMatchReport::from)
                })
                .await
            }
        };
        self.health.worker_finished(&result);
        result
    }

    pub async fn compute(&self, req: &ComputeRequest) -> Result<ProbabilityOutcome> {
        let _in_flight = self.health.worker_started();
        let result = match &self.backend {
            Backend::Process => {
                let mut inv = self
                    .invocation(WINPROB_MARKER, self.cfg.worker_timeout)
                    .arg("compute");
                if let Some(id) = &req.match_id {
                    // Joined form: the value is never parsed as a flag.
                    inv = inv.arg(format!("--match-id={id}"));
                    if req.resolved {
                        inv = inv.arg("--resolved");
                    }
                }
                let inv = inv.arg("--").arg(req.nickname.as_str());
                run_process(&inv).await.and_then(decode_payload)
            }
            Backend::Task(api) => {
                let api = api.clone();
                let req = req.clone();
                let budget = self.cfg.resolve_budget;
                run_supervised("compute", self.cfg.worker_timeout, async move {
                    compute_probability(api.as_ref(), &req, budget).await
                })
                .await
            }
        };
        if let Err(e) = &result {
            info!(nickname = %req.nickname, error_kind = %e.kind(), error = %e, "compute run failed");
        }
        self.health.worker_finished(&result);
        result
    }

    fn invocation(&self, marker: &str, timeout: std::time::Duration) -> ProcessInvocation {
        ProcessInvocation::new(self.cfg.worker_program.clone(), marker, timeout)
            .cwd(self.cfg.worker_dir.clone())
            .env("LOG_LEVEL", self.cfg.log_level.as_str())
    }
}

/// Interpret a worker payload: `ok: true` decodes into `T`, anything else is
/// the worker's own reported failure.
pub fn decode_payload<T: DeserializeOwned>(mut payload: Value) -> Result<T> {
    let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !ok {
        return Err(rejected(&payload));
    }
    if let Some(obj) = payload.as_object_mut() {
        obj.remove("ok");
    }
    Ok(serde_json::from_value(payload)?)
}

fn rejected(payload: &Value) -> AppError {
    let kind = payload
        .get("error_kind")
        .cloned()
        .and_then(|k| serde_json::from_value::<ErrorKind>(k).ok())
        .unwrap_or(ErrorKind::Rejected);
    let reason = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("worker reported a failure without a reason")
        .to_string();
    AppError::Rejected {
        kind,
        reason,
        detail: payload.get("detail").cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    /// Write an executable shell script standing in for the worker binary.
    /// It receives the real subcommand arguments as `$1..`.
    pub fn write_worker_script(body: &str) -> PathBuf {
        let n = NEXT.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("winprob-worker-{}-{n}.sh", std::process::id()));
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
