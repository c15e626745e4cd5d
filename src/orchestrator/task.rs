use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::{AppError, CapturedOutput, Result};

/// Aborts the wrapped task when dropped, so a cancelled request does not
/// leave its computation running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `fut` as its own task with a wall-clock bound. The join handle is the
/// result channel: the task's own `Result<T>` comes back unchanged, a panic
/// becomes `TaskFailed`, and the deadline becomes the same timeout failure a
/// worker process would report.
pub async fn run_supervised<F, T>(name: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut guard = AbortOnDrop(tokio::spawn(fut));
    match tokio::time::timeout(timeout, &mut guard.0).await {
        Err(_) => {
            warn!(task = name, timeout_ms = timeout.as_millis() as u64, "supervised task timed out, aborting");
            Err(AppError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
                output: CapturedOutput::default(),
            })
        }
        Ok(Err(join_err)) => {
            error!(task = name, error = %join_err, "supervised task failed");
            Err(AppError::TaskFailed(format!("{name}: {join_err}")))
        }
        Ok(Ok(result)) => result,
    }
}
