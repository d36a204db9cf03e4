//! Startup and refresh orchestration.
//!
//! Startup loads every asset in order, then asks the backend for the stored
//! parameters and their series. Refresh sends the panel's current values and
//! redraws the charts; it never writes back to the panel.
//!
//! Refreshes may overlap. They are neither deduplicated nor cancelled, and
//! each response is applied when it arrives, so the last response to arrive
//! wins even if it belongs to the older request.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::backend::Backend;
use crate::charts::ChartWidgetSet;
use crate::loader::{Asset, ScriptLoader};
use crate::logging::{log, log_transition, obj, v_str, Domain, Level, ProfileScope};
use crate::messages::{MessageSink, Severity};
use crate::params::ParameterPanel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    LoadingScripts,
    FetchingInitial,
    Ready,
    FetchingUpdate,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::LoadingScripts => "loading_scripts",
            SyncState::FetchingInitial => "fetching_initial",
            SyncState::Ready => "ready",
            SyncState::FetchingUpdate => "fetching_update",
            SyncState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    Start,
    ScriptsLoaded,
    InitialApplied,
    Fail,
    RefreshStarted,
    /// The last in-flight refresh completed, successfully or not.
    RefreshSettled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SyncState,
    pub event: SyncEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition: {:?} in state {}", self.event, self.from.as_str())
    }
}

impl std::error::Error for TransitionError {}

pub fn apply_event(state: SyncState, event: SyncEvent) -> Result<SyncState, TransitionError> {
    match (state, event) {
        (SyncState::Idle, SyncEvent::Start) => Ok(SyncState::LoadingScripts),
        (SyncState::LoadingScripts, SyncEvent::ScriptsLoaded) => Ok(SyncState::FetchingInitial),
        (SyncState::FetchingInitial, SyncEvent::InitialApplied) => Ok(SyncState::Ready),
        (SyncState::LoadingScripts, SyncEvent::Fail) | (SyncState::FetchingInitial, SyncEvent::Fail) => {
            Ok(SyncState::Failed)
        }
        (SyncState::Ready, SyncEvent::RefreshStarted)
        | (SyncState::FetchingUpdate, SyncEvent::RefreshStarted) => Ok(SyncState::FetchingUpdate),
        (SyncState::FetchingUpdate, SyncEvent::RefreshSettled) => Ok(SyncState::Ready),
        (from, event) => Err(TransitionError { from, event }),
    }
}

struct Lifecycle {
    state: SyncState,
    in_flight: usize,
}

impl Lifecycle {
    fn step(&mut self, event: SyncEvent) -> Result<SyncState, TransitionError> {
        let next = apply_event(self.state, event)?;
        if next != self.state {
            log_transition(self.state.as_str(), next.as_str());
        }
        self.state = next;
        Ok(next)
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("sync controller lock poisoned"))
}

pub struct SyncController<P: ParameterPanel> {
    backend: Box<dyn Backend>,
    loader: Mutex<Option<ScriptLoader>>,
    assets: Vec<String>,
    widgets: Mutex<ChartWidgetSet>,
    panel: Mutex<P>,
    sink: Arc<dyn MessageSink>,
    lifecycle: Mutex<Lifecycle>,
}

impl<P: ParameterPanel> SyncController<P> {
    pub fn new(
        backend: Box<dyn Backend>,
        loader: ScriptLoader,
        assets: Vec<String>,
        widgets: ChartWidgetSet,
        panel: P,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            backend,
            loader: Mutex::new(Some(loader)),
            assets,
            widgets: Mutex::new(widgets),
            panel: Mutex::new(panel),
            sink,
            lifecycle: Mutex::new(Lifecycle {
                state: SyncState::Idle,
                in_flight: 0,
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        self.lifecycle
            .lock()
            .map(|l| l.state)
            .unwrap_or(SyncState::Failed)
    }

    pub fn with_widgets<R>(&self, f: impl FnOnce(&ChartWidgetSet) -> R) -> Result<R> {
        Ok(f(&*lock(&self.widgets)?))
    }

    pub fn with_panel<R>(&self, f: impl FnOnce(&mut P) -> R) -> Result<R> {
        Ok(f(&mut *lock(&self.panel)?))
    }

    fn transition(&self, event: SyncEvent) -> Result<SyncState> {
        let mut life = lock(&self.lifecycle)?;
        Ok(life.step(event)?)
    }

    fn fail(&self, message: &str) {
        self.sink.display(message, Severity::Error);
        if let Err(e) = self.transition(SyncEvent::Fail) {
            log(Level::Error, Domain::Sync, "fail_transition", obj(&[("msg", v_str(&e.to_string()))]));
        }
    }

    /// Load assets, then fetch and apply the initial state.
    pub async fn startup(&self) -> Result<()> {
        let _scope = ProfileScope::new("startup");
        self.transition(SyncEvent::Start)?;

        let mut loader = lock(&self.loader)?
            .take()
            .ok_or_else(|| anyhow!("asset loader already consumed"))?;
        let widgets = &self.widgets;
        let loaded = loader
            .load_chain(&self.assets, |asset| {
                if let Asset::Chart(config) = asset {
                    lock(widgets)?.create(config)?;
                }
                Ok(())
            })
            .await;
        *lock(&self.loader)? = Some(loader);

        if let Err(e) = loaded {
            self.fail(&e.to_string());
            return Err(e.into());
        }
        self.transition(SyncEvent::ScriptsLoaded)?;

        let applied = match self.backend.get_start().await {
            Ok(start) => {
                let drawn = lock(&self.widgets)?.apply(start.diagrams.assignments());
                // the panel only shows values whose series made it onto the charts
                if drawn.is_ok() {
                    lock(&self.panel)?.write_all(&start.params);
                }
                drawn
            }
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            self.fail(&format!("Error fetching initial state: {:#}", e));
            return Err(e);
        }
        self.transition(SyncEvent::InitialApplied)?;
        Ok(())
    }

    /// Send the panel's values to the backend and redraw every chart.
    pub async fn refresh(&self) -> Result<()> {
        {
            let mut life = lock(&self.lifecycle)?;
            life.step(SyncEvent::RefreshStarted)?;
            life.in_flight += 1;
        }

        let result = self.fetch_and_apply().await;

        {
            let mut life = lock(&self.lifecycle)?;
            life.in_flight -= 1;
            if life.in_flight == 0 {
                life.step(SyncEvent::RefreshSettled)?;
            }
        }
        if let Err(e) = &result {
            self.sink
                .display(&format!("Error refreshing charts: {:#}", e), Severity::Error);
        }
        result
    }

    async fn fetch_and_apply(&self) -> Result<()> {
        let params = lock(&self.panel)?.read_all();
        let digest = params.digest();
        let _scope = ProfileScope::with_context("refresh", &[("params_digest", v_str(&digest))]);
        let diagrams = self.backend.get_data(&params).await?;
        lock(&self.widgets)?.apply(diagrams.assignments())?;
        log(
            Level::Info,
            Domain::Sync,
            "refresh_applied",
            obj(&[("params_digest", v_str(&digest))]),
        );
        Ok(())
    }
}
