//! Scripted backend and asset source shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use pvgrid::backend::Backend;
use pvgrid::charts::ChartWidgetSet;
use pvgrid::config::ContractVersion;
use pvgrid::loader::{default_assets, AssetSource, EmbeddedAssetSource, ScriptLoader};
use pvgrid::messages::MemorySink;
use pvgrid::params::{MemoryPanel, ParameterSet};
use pvgrid::series::{Diagrams, StartState};
use pvgrid::sync::SyncController;

pub fn start_body() -> Value {
    json!({
        "params": {
            "year": 2024, "month": 6, "day": 21,
            "panel_power": 5000, "panel_slope": 27, "panel_east_azm": -15,
            "panel_temp_red": 0.0035, "tau": 0.2, "tau_down": 0.1, "k_gain": 0.9,
            "iam_factor": 0.05,
            "start_azm": 90, "start_elv": 5, "stop_azm": 270, "stop_elv": 5
        },
        "prod_diagram": [
            {"name": "actual", "type": "area", "data": [[1, 2]]},
            {"name": "estimated", "type": "line", "data": [[1, 2.5]]}
        ],
        "incidence_diagram": [{"name": "incidence", "data": [[1, 35.0]]}],
        "temp_diagram": [{"name": "outdoor", "data": [[1, 18.5]]}],
        "ame_diagram": {"name": "ame", "data": [[1, 0.92]]}
    })
}

/// Diagram payload whose every series carries a single point at `x` with value `y`.
pub fn data_body(x: i64, y: f64) -> Value {
    json!({
        "prod_diagram": [{"name": "actual", "data": [[x, y]]}],
        "incidence_diagram": [{"name": "incidence", "data": [[x, y]]}],
        "temp_diagram": [{"name": "outdoor", "data": [[x, y]]}],
        "ame_diagram": {"name": "ame", "data": [[x, y]]}
    })
}

pub enum Reply {
    Ok(Value),
    Fail(String),
}

/// Serves queued replies, each after its own delay.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub start_replies: Arc<Mutex<VecDeque<Reply>>>,
    pub data_replies: Arc<Mutex<VecDeque<(Duration, Reply)>>>,
    pub start_calls: Arc<AtomicUsize>,
    pub data_requests: Arc<Mutex<Vec<ParameterSet>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(self, reply: Reply) -> Self {
        self.start_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_data(self, delay: Duration, reply: Reply) -> Self {
        self.data_replies.lock().unwrap().push_back((delay, reply));
        self
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn data_requests(&self) -> Vec<ParameterSet> {
        self.data_requests.lock().unwrap().clone()
    }
}

fn resolve(reply: Reply) -> Result<Value> {
    match reply {
        Reply::Ok(v) => Ok(v),
        Reply::Fail(msg) => Err(anyhow!(msg)),
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn get_start(&self) -> Result<StartState> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .start_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected /get_start"))?;
        StartState::from_json(&resolve(reply)?, ContractVersion::Extended)
    }

    async fn get_data(&self, params: &ParameterSet) -> Result<Diagrams> {
        self.data_requests.lock().unwrap().push(params.clone());
        let (delay, reply) = self
            .data_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected /get_data"))?;
        tokio::time::sleep(delay).await;
        Diagrams::from_json(&resolve(reply)?, ContractVersion::Extended)
    }
}

/// Wraps the embedded assets, records the order of load starts and ends,
/// and fails on request.
#[derive(Clone, Default)]
pub struct RecordingSource {
    pub events: Arc<Mutex<Vec<String>>>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub fail_on: Option<String>,
}

impl RecordingSource {
    pub fn failing_on(path: &str) -> Self {
        Self {
            fail_on: Some(path.to_string()),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetSource for RecordingSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("start:{}", path));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = if self.fail_on.as_deref() == Some(path) {
            Err(anyhow!("404"))
        } else {
            EmbeddedAssetSource::new().fetch(path).await
        };

        self.events.lock().unwrap().push(format!("end:{}", path));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn controller(
    backend: ScriptedBackend,
    source: RecordingSource,
    sink: MemorySink,
) -> SyncController<MemoryPanel> {
    SyncController::new(
        Box::new(backend),
        ScriptLoader::new(Box::new(source)),
        default_assets(ContractVersion::Extended),
        ChartWidgetSet::in_memory(),
        MemoryPanel::new(),
        Arc::new(sink),
    )
}
