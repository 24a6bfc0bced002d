//! Shared fixtures and in-memory port implementations for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use flowrun_types::credential::CredentialData;
use flowrun_types::error::RepositoryError;
use flowrun_types::event::{LifecycleEvent, PushMessage};
use flowrun_types::graph::{Connection, Graph, Node};
use flowrun_types::run::{
    ExecutionMode, Item, NodeExecutionStatus, RunExecutionData, RunPatch, RunSnapshot, RunStatus,
    SourceRef, TaskData, TaskOutput, WaitingRun,
};
use serde_json::json;

use crate::event::NotificationChannel;
use crate::repository::credential::CredentialProvider;
use crate::repository::event_log::EventLogReader;
use crate::repository::run::RunStore;
use crate::router::{AuthScheme, HttpRequest, HttpResponse, HttpTransport, RequestError};
use crate::scheduler::{GraphRunner, ResumeRequest, SchedulingError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A fixed instant plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
}

/// `A (trigger) -> B (filter) -> C (http)`.
pub fn chain_graph() -> Graph {
    Graph {
        id: "wf-chain".to_string(),
        name: "chain".to_string(),
        active: false,
        nodes: vec![
            Node::new("A", "core.manualTrigger"),
            Node::new("B", "core.filter"),
            Node::new("C", "http.request"),
        ],
        connections: vec![Connection::main("A", "B"), Connection::main("B", "C")],
    }
}

/// A successful task with one output slot.
pub fn task(items: Vec<Item>, source: Vec<Option<SourceRef>>) -> TaskData {
    TaskData {
        start_time: at(0),
        execution_time: 3,
        execution_status: NodeExecutionStatus::Success,
        error: None,
        data: Some(TaskOutput { main: vec![items] }),
        source,
    }
}

/// A emits `n = 0..3`, B keeps items 0 and 2, C emits one item per B item.
pub fn chain_run_data() -> RunExecutionData {
    let a = (0..3).map(|n| Item::new(json!({ "n": n }))).collect();
    let b = vec![
        Item::new(json!({ "n": 0 })).paired_with(0),
        Item::new(json!({ "n": 2 })).paired_with(2),
    ];
    let c = (0..2)
        .map(|i| Item::new(json!({ "status": 200, "row": i })).paired_with(i))
        .collect();

    let mut data = RunExecutionData::default();
    data.run_data.insert("A".to_string(), vec![task(a, Vec::new())]);
    data.run_data
        .insert("B".to_string(), vec![task(b, vec![Some(SourceRef::new("A"))])]);
    data.run_data
        .insert("C".to_string(), vec![task(c, vec![Some(SourceRef::new("B"))])]);
    data.last_node_executed = Some("C".to_string());
    data
}

/// A chain run parked until `wake_at`.
pub fn waiting_run(id: &str, wake_at: DateTime<Utc>) -> RunSnapshot {
    RunSnapshot {
        id: id.to_string(),
        workflow: chain_graph(),
        data: chain_run_data(),
        mode: ExecutionMode::Webhook,
        status: RunStatus::Waiting,
        finished: false,
        started_at: at(0),
        stopped_at: None,
        wait_till: Some(wake_at),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockCredentials {
    entries: HashMap<String, CredentialData>,
}

impl MockCredentials {
    pub fn with(name: &str, fields: &[(&str, &str)]) -> Self {
        let mut entries = HashMap::new();
        entries.insert(name.to_string(), fields.iter().copied().collect());
        Self { entries }
    }
}

impl CredentialProvider for MockCredentials {
    async fn get(&self, name: &str) -> Result<Option<CredentialData>, RepositoryError> {
        Ok(self.entries.get(name).cloned())
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Replays canned responses in order and records what was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    auth: Mutex<Vec<Option<AuthScheme>>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn auth_seen(&self) -> Vec<Option<AuthScheme>> {
        self.auth.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        auth: Option<&AuthScheme>,
    ) -> Result<HttpResponse, RequestError> {
        self.requests.lock().unwrap().push(request);
        self.auth.lock().unwrap().push(auth.cloned());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RequestError::Transport("no scripted response left".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Run store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<BTreeMap<String, RunSnapshot>>,
}

impl MemoryRunStore {
    pub fn insert(&self, run: RunSnapshot) {
        self.runs.lock().unwrap().insert(run.id.clone(), run);
    }

    pub fn get(&self, id: &str) -> Option<RunSnapshot> {
        self.runs.lock().unwrap().get(id).cloned()
    }
}

impl RunStore for MemoryRunStore {
    async fn find(&self, execution_id: &str) -> Result<Option<RunSnapshot>, RepositoryError> {
        Ok(self.get(execution_id))
    }

    async fn update(&self, execution_id: &str, patch: RunPatch) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(execution_id).ok_or(RepositoryError::NotFound)?;
        patch.apply_to(run);
        Ok(())
    }

    async fn find_waiting(&self, before: DateTime<Utc>) -> Result<Vec<WaitingRun>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        let mut waiting: Vec<WaitingRun> = runs
            .values()
            .filter(|run| !run.finished)
            .filter_map(|run| {
                run.wait_till
                    .filter(|wake_at| *wake_at <= before)
                    .map(|wake_at| WaitingRun {
                        execution_id: run.id.clone(),
                        wake_at,
                    })
            })
            .collect();
        waiting.sort_by_key(|w| w.wake_at);
        Ok(waiting)
    }

    async fn list_unfinished(&self) -> Result<Vec<String>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .filter(|run| !run.finished && !run.status.is_final() && run.wait_till.is_none())
            .filter(|run| run.status != RunStatus::Crashed)
            .map(|run| run.id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Runner, event log, notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingRunner {
    resumed: Mutex<Vec<ResumeRequest>>,
}

impl RecordingRunner {
    pub fn resumed(&self) -> Vec<ResumeRequest> {
        self.resumed.lock().unwrap().clone()
    }
}

impl GraphRunner for RecordingRunner {
    async fn resume(&self, request: ResumeRequest) -> Result<(), SchedulingError> {
        self.resumed.lock().unwrap().push(request);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEventLog {
    logs: Mutex<HashMap<String, Vec<LifecycleEvent>>>,
}

impl MockEventLog {
    /// Store a log under the execution id of its first event.
    pub fn insert(&self, events: Vec<LifecycleEvent>) {
        if let Some(first) = events.first() {
            let id = first.execution_id.clone();
            self.logs.lock().unwrap().insert(id, events);
        }
    }
}

impl EventLogReader for MockEventLog {
    async fn read(&self, execution_id: &str) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<PushMessage>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationChannel for RecordingChannel {
    fn send(&self, message: PushMessage) {
        self.sent.lock().unwrap().push(message);
    }
}
