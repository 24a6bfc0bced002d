//! Wake-time tracking for parked runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flowrun_types::config::SchedulerConfig;
use flowrun_types::credential::CredentialData;
use flowrun_types::run::{
    ExecutionMode, RunExecutionData, RunPatch, RunSnapshot, RunStatus, TaskError,
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::runner::{GraphRunner, ResumeRequest};
use super::SchedulingError;
use crate::repository::credential::CredentialProvider;
use crate::repository::run::RunStore;

/// Error recorded on a run canceled while waiting.
pub const CANCELED_MESSAGE: &str = "Workflow-Execution has been canceled!";

/// Timing knobs of the tracker.
#[derive(Debug, Clone, Copy)]
pub struct WaitTrackerConfig {
    pub poll_interval: Duration,
    /// How far ahead of now a poll looks for runs to arm.
    pub lookahead: Duration,
}

impl From<&SchedulerConfig> for WaitTrackerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            lookahead: config.lookahead(),
        }
    }
}

impl Default for WaitTrackerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Returned by [`WaitTracker::cancel`] for a run that was waiting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSummary {
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub finished: bool,
}

/// What happened when a timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    /// The run was no longer armed locally, e.g. it was canceled or already
    /// fired.
    NotArmed,
}

#[derive(Debug)]
struct ArmedTimer {
    wake_at: DateTime<Utc>,
    token: CancellationToken,
}

/// Owns the armed timers of one process.
///
/// Cloning is cheap and shares state; spawned timers hold a clone.
pub struct WaitTracker<S, R, C> {
    store: Arc<S>,
    runner: Arc<R>,
    credentials: Arc<C>,
    config: WaitTrackerConfig,
    timers: Arc<DashMap<String, ArmedTimer>>,
    poll: Arc<Mutex<Option<CancellationToken>>>,
}

impl<S, R, C> Clone for WaitTracker<S, R, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            runner: Arc::clone(&self.runner),
            credentials: Arc::clone(&self.credentials),
            config: self.config,
            timers: Arc::clone(&self.timers),
            poll: Arc::clone(&self.poll),
        }
    }
}

impl<S, R, C> WaitTracker<S, R, C>
where
    S: RunStore + 'static,
    R: GraphRunner + 'static,
    C: CredentialProvider + 'static,
{
    pub fn new(store: Arc<S>, runner: Arc<R>, credentials: Arc<C>, config: WaitTrackerConfig) -> Self {
        Self {
            store,
            runner,
            credentials,
            config,
            timers: Arc::new(DashMap::new()),
            poll: Arc::new(Mutex::new(None)),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the poll loop. The first poll runs immediately. No-op when
    /// already started.
    pub fn start(&self) {
        let mut poll = self.poll.lock().unwrap_or_else(PoisonError::into_inner);
        if poll.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *poll = Some(token.clone());

        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => match tracker.poll_once().await {
                        Ok(0) => {}
                        Ok(armed) => tracing::debug!(armed, "armed wake timers"),
                        Err(e) => tracing::warn!(error = %e, "wait poll failed"),
                    },
                }
            }
            tracing::debug!("wait poll loop stopped");
        });

        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            lookahead_secs = self.config.lookahead.as_secs(),
            "wait tracker started"
        );
    }

    /// Stop polling and disarm every timer. No-op when not started.
    pub fn stop(&self) {
        let token = self
            .poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            tracing::info!("wait tracker stopped");
        }

        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, timer)) = self.timers.remove(&id) {
                timer.token.cancel();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Arming
    // -----------------------------------------------------------------------

    /// Look for runs waking within the lookahead window and arm them.
    /// Returns how many new timers were armed.
    pub async fn poll_once(&self) -> Result<usize, SchedulingError> {
        let lookahead = chrono::Duration::from_std(self.config.lookahead)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let waiting = self
            .store
            .find_waiting(Utc::now() + lookahead)
            .await
            .map_err(|e| SchedulingError::Store(e.to_string()))?;

        Ok(waiting
            .into_iter()
            .filter(|run| self.arm(&run.execution_id, run.wake_at))
            .count())
    }

    /// Arm a one-shot timer for `execution_id`. Returns `false` (and does
    /// nothing) when one is already armed.
    pub fn arm(&self, execution_id: &str, wake_at: DateTime<Utc>) -> bool {
        let token = match self.timers.entry(execution_id.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(ArmedTimer {
                    wake_at,
                    token: token.clone(),
                });
                token
            }
        };

        let delay = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let tracker = self.clone();
        let id = execution_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(execution_id = %id, "wake timer disarmed");
                }
                _ = tokio::time::sleep(delay) => match tracker.fire(&id).await {
                    Ok(ResumeOutcome::Resumed) => {
                        tracing::info!(execution_id = %id, "resumed waiting execution");
                    }
                    Ok(ResumeOutcome::NotArmed) => {}
                    Err(e) => {
                        tracing::warn!(execution_id = %id, error = %e, "could not resume execution");
                    }
                },
            }
        });

        tracing::debug!(execution_id, %wake_at, delay_ms = delay.as_millis() as u64, "armed wake timer");
        true
    }

    pub fn is_armed(&self, execution_id: &str) -> bool {
        self.timers.contains_key(execution_id)
    }

    /// Armed execution ids with their wake times, earliest first.
    pub fn armed(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut armed: Vec<_> = self
            .timers
            .iter()
            .map(|e| (e.key().clone(), e.value().wake_at))
            .collect();
        armed.sort_by_key(|(_, wake_at)| *wake_at);
        armed
    }

    // -----------------------------------------------------------------------
    // Cancel / resume
    // -----------------------------------------------------------------------

    /// Disarm the run's timer and, if the stored run is still waiting, mark
    /// it canceled. Returns `None` when there was nothing waiting to cancel.
    pub async fn cancel(&self, execution_id: &str) -> Result<Option<StopSummary>, SchedulingError> {
        if let Some((_, timer)) = self.timers.remove(execution_id) {
            timer.token.cancel();
        }

        let Some(run) = self.load(execution_id).await? else {
            return Ok(None);
        };
        if run.finished || run.status.is_final() || run.wait_till.is_none() {
            return Ok(None);
        }

        let stopped_at = Utc::now();
        let mut data = run.data.clone();
        data.error = Some(TaskError::new(CANCELED_MESSAGE));
        self.store
            .update(
                execution_id,
                RunPatch {
                    status: Some(RunStatus::Canceled),
                    finished: Some(false),
                    data: Some(data),
                    stopped_at: Some(Some(stopped_at)),
                    wait_till: Some(None),
                },
            )
            .await
            .map_err(|e| SchedulingError::Store(e.to_string()))?;

        tracing::info!(execution_id, "canceled waiting execution");
        Ok(Some(StopSummary {
            mode: run.mode,
            started_at: run.started_at,
            stopped_at,
            finished: false,
        }))
    }

    /// Timer body. The local entry is removed before anything else so a run
    /// is resumed at most once per arming.
    pub(crate) async fn fire(&self, execution_id: &str) -> Result<ResumeOutcome, SchedulingError> {
        if self.timers.remove(execution_id).is_none() {
            return Ok(ResumeOutcome::NotArmed);
        }

        let mut run = self
            .load(execution_id)
            .await?
            .ok_or_else(|| SchedulingError::RunNotFound(execution_id.to_string()))?;
        if run.status == RunStatus::Canceled {
            return Err(SchedulingError::Canceled(execution_id.to_string()));
        }
        if run.finished || run.status.is_final() {
            return Err(SchedulingError::AlreadyFinished(execution_id.to_string()));
        }
        if run.wait_till.is_none() {
            return Err(SchedulingError::NotWaiting(execution_id.to_string()));
        }

        // Claim the run durably so later polls no longer see it waiting.
        self.store
            .update(
                execution_id,
                RunPatch {
                    status: Some(RunStatus::Running),
                    wait_till: Some(None),
                    ..RunPatch::default()
                },
            )
            .await
            .map_err(|e| SchedulingError::Store(e.to_string()))?;
        run.status = RunStatus::Running;
        run.wait_till = None;

        let data = run.data.clone();
        let resumed = match self.reattach_credentials(&run).await {
            Ok(credentials) => {
                self.runner
                    .resume(ResumeRequest {
                        execution_id: execution_id.to_string(),
                        snapshot: run,
                        credentials,
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(err) = resumed {
            self.record_failure(execution_id, data, &err).await;
            return Err(err);
        }
        Ok(ResumeOutcome::Resumed)
    }

    /// Persist a failed resumption as an error so the run is never re-armed.
    async fn record_failure(
        &self,
        execution_id: &str,
        mut data: RunExecutionData,
        err: &SchedulingError,
    ) {
        data.error = Some(TaskError::new(format!("Could not resume execution: {err}")));
        let patch = RunPatch {
            status: Some(RunStatus::Error),
            finished: Some(false),
            data: Some(data),
            stopped_at: Some(Some(Utc::now())),
            wait_till: Some(None),
        };
        if let Err(e) = self.store.update(execution_id, patch).await {
            tracing::error!(execution_id, error = %e, "could not record failed resumption");
        }
    }

    async fn load(&self, execution_id: &str) -> Result<Option<RunSnapshot>, SchedulingError> {
        self.store
            .find(execution_id)
            .await
            .map_err(|e| SchedulingError::Store(e.to_string()))
    }

    async fn reattach_credentials(
        &self,
        run: &RunSnapshot,
    ) -> Result<HashMap<String, CredentialData>, SchedulingError> {
        let names: BTreeSet<&String> = run
            .workflow
            .nodes
            .iter()
            .flat_map(|node| node.credentials.values())
            .collect();

        let mut credentials = HashMap::with_capacity(names.len());
        for name in names {
            let data = self
                .credentials
                .get(name)
                .await
                .map_err(|e| SchedulingError::Credentials(e.to_string()))?
                .ok_or_else(|| {
                    SchedulingError::Credentials(format!("credential \"{name}\" not found"))
                })?;
            credentials.insert(name.clone(), data);
        }
        Ok(credentials)
    }
}
