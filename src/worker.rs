//! Worker side of the marker protocol. Logs go to stderr; stdout carries at
//! most one marker line, printed last.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::compute::{compute_probability, ComputeRequest};
use crate::config::{Config, MATCHID_MARKER, WINPROB_MARKER};
use crate::error::{ErrorBody, Result};
use crate::faceit::HttpFaceitApi;
use crate::resolver::resolve_match;
use crate::types::{ActiveMatchReport, ProbabilityOutcome};

/// Success payload: the serialized value with `ok: true` merged in.
pub fn success_payload<T: Serialize>(value: &T) -> Result<Value> {
    let mut v = serde_json::to_value(value)?;
    if let Some(obj) = v.as_object_mut() {
        obj.insert("ok".to_string(), Value::Bool(true));
    }
    Ok(v)
}

/// The marker line for a result. Failures become an `ok: false` body.
pub fn marker_line<T: Serialize>(marker: &str, result: &Result<T>) -> String {
    let payload = match result {
        Ok(v) => success_payload(v),
        Err(e) => serde_json::to_value(ErrorBody::from(e)).map_err(Into::into),
    };
    let payload = payload.unwrap_or_else(|e| {
        serde_json::json!({"ok": false, "error_kind": "internal", "error": e.to_string()})
    });
    format!("{marker}{payload}")
}

fn emit<T: Serialize>(marker: &str, result: Result<T>) -> i32 {
    if let Err(e) = &result {
        error!(error_kind = %e.kind(), error = %e, "worker failed");
    }
    let line = marker_line(marker, &result);
    let mut out = std::io::stdout().lock();
    if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
        return 2;
    }
    if result.is_ok() {
        0
    } else {
        1
    }
}

async fn resolve(cfg: &Config, nickname: &str) -> Result<ActiveMatchReport> {
    let api = HttpFaceitApi::new(cfg)?;
    let resolved = resolve_match(&api, nickname, cfg.resolve_budget).await?;
    Ok(ActiveMatchReport::from(resolved))
}

async fn compute(cfg: &Config, req: &ComputeRequest) -> Result<ProbabilityOutcome> {
    let api = HttpFaceitApi::new(cfg)?;
    compute_probability(&api, req, cfg.resolve_budget).await
}

/// `resolve` subcommand. Returns the process exit code.
pub async fn run_resolve(cfg: &Config, nickname: &str) -> i32 {
    emit(MATCHID_MARKER, resolve(cfg, nickname).await)
}

/// `compute` subcommand. Returns the process exit code.
pub async fn run_compute(cfg: &Config, req: ComputeRequest) -> i32 {
    emit(WINPROB_MARKER, compute(cfg, &req).await)
}
