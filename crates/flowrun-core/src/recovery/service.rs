//! Recovery service: load, reconstruct, persist, notify.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowrun_types::config::RecoveryConfig;
use flowrun_types::event::{PushMessage, EXECUTION_FINISHED};
use flowrun_types::run::{RunPatch, RunSnapshot, RunStatus};
use serde_json::json;
use tokio::task::JoinHandle;

use super::reconstruct::reconstruct;
use super::ReconstructionError;
use crate::event::NotificationChannel;
use crate::repository::event_log::EventLogReader;
use crate::repository::run::RunStore;

/// A run that was marked crashed.
#[derive(Debug)]
pub struct RecoveredRun {
    /// The run as persisted.
    pub snapshot: RunSnapshot,
    pub crashed_nodes: Vec<String>,
    /// Resolves to `true` once the delayed notification went out, `false`
    /// when it was dropped because the run changed in the meantime.
    pub notification: JoinHandle<bool>,
}

/// Outcome of [`CrashRecovery::recover_all`].
#[derive(Debug, Default)]
pub struct RecoverySummary {
    pub recovered: Vec<String>,
    /// Execution id and error message.
    pub failed: Vec<(String, String)>,
}

pub struct CrashRecovery<S, E, N> {
    store: Arc<S>,
    events: Arc<E>,
    notifier: Arc<N>,
    config: RecoveryConfig,
}

impl<S, E, N> CrashRecovery<S, E, N>
where
    S: RunStore + 'static,
    E: EventLogReader,
    N: NotificationChannel + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<E>, notifier: Arc<N>, config: RecoveryConfig) -> Self {
        Self {
            store,
            events,
            notifier,
            config,
        }
    }

    /// Mark one interrupted run as crashed.
    ///
    /// The `executionFinished` notification is sent after the configured
    /// delay, and only if the run is still in the state written here.
    pub async fn recover(&self, execution_id: &str) -> Result<RecoveredRun, ReconstructionError> {
        let run = self
            .store
            .find(execution_id)
            .await
            .map_err(|e| ReconstructionError::Store(e.to_string()))?
            .ok_or_else(|| ReconstructionError::RunNotFound(execution_id.to_string()))?;
        if run.finished || run.status.is_final() {
            return Err(ReconstructionError::RunAlreadyFinished(execution_id.to_string()));
        }

        let events = self
            .events
            .read(execution_id)
            .await
            .map_err(|e| ReconstructionError::EventLog(e.to_string()))?;
        let rebuilt = reconstruct(
            &run.workflow,
            &run.data,
            &events,
            &self.config.trigger_node_types,
        )?;

        let patch = RunPatch {
            status: Some(RunStatus::Crashed),
            data: Some(rebuilt.data),
            stopped_at: Some(rebuilt.stopped_at),
            ..Default::default()
        };
        let mut snapshot = run;
        patch.clone().apply_to(&mut snapshot);
        self.store
            .update(execution_id, patch)
            .await
            .map_err(|e| ReconstructionError::Store(e.to_string()))?;

        tracing::info!(
            execution_id,
            crashed = rebuilt.crashed_nodes.len(),
            events = events.len(),
            "marked execution as crashed"
        );

        let notification = tokio::spawn(notify_later(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            execution_id.to_string(),
            snapshot.stopped_at,
            self.config.notify_delay(),
        ));

        Ok(RecoveredRun {
            snapshot,
            crashed_nodes: rebuilt.crashed_nodes,
            notification,
        })
    }

    /// Recover every run the store reports as unfinished and not parked.
    ///
    /// One failing run does not stop the others.
    pub async fn recover_all(&self) -> Result<RecoverySummary, ReconstructionError> {
        let ids = self
            .store
            .list_unfinished()
            .await
            .map_err(|e| ReconstructionError::Store(e.to_string()))?;

        let mut summary = RecoverySummary::default();
        for id in ids {
            match self.recover(&id).await {
                Ok(_) => summary.recovered.push(id),
                Err(e) => {
                    tracing::warn!(execution_id = %id, error = %e, "crash recovery failed");
                    summary.failed.push((id, e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

async fn notify_later<S: RunStore, N: NotificationChannel>(
    store: Arc<S>,
    notifier: Arc<N>,
    execution_id: String,
    stopped_at: Option<DateTime<Utc>>,
    delay: Duration,
) -> bool {
    tokio::time::sleep(delay).await;

    let run = match store.find(&execution_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            tracing::debug!(%execution_id, "run vanished before crash notification");
            return false;
        }
        Err(e) => {
            tracing::warn!(%execution_id, error = %e, "could not re-read crashed run");
            return false;
        }
    };
    if run.status != RunStatus::Crashed || run.stopped_at != stopped_at {
        tracing::debug!(%execution_id, status = %run.status, "run changed, crash notification dropped");
        return false;
    }

    notifier.send(PushMessage {
        kind: EXECUTION_FINISHED.to_string(),
        payload: json!({
            "executionId": execution_id,
            "data": {
                "data": run.data,
                "finished": false,
                "mode": run.mode,
                "startedAt": run.started_at,
                "stoppedAt": run.stopped_at,
                "waitTill": run.wait_till,
                "status": RunStatus::Crashed,
            },
        }),
        target_id: execution_id,
    });
    true
}
