//! Fakes shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};

use promsync_core::catalog::{Agent, AgentType, CatalogSnapshot, MetricsResolutions, Node, Service};
use promsync_core::config::ServerJobConfig;
use promsync_core::error::{ReconcileError, ReloadError, ValidationError};
use promsync_scrape::assembler::CandidateBytes;

use crate::checker::ConfigCheck;
use crate::pass::Settings;
use crate::reload::Reload;

/// One pmm-agent and one mysqld_exporter at `10.0.0.5:9104` labelled `instance=db1`.
pub fn fleet() -> CatalogSnapshot {
    let mut pmm_agent = Agent::new("/agent_id/pmm1", AgentType::PmmAgent);
    pmm_agent.runs_on_node_id = Some("/node_id/1".into());

    let mut mysqld = Agent::new("/agent_id/m1", AgentType::MysqldExporter);
    mysqld.pmm_agent_id = Some("/agent_id/pmm1".into());
    mysqld.service_id = Some("/service_id/1".into());
    mysqld.listen_port = Some(9104);
    mysqld.custom_labels = Some(r#"{"instance": "db1"}"#.into());

    CatalogSnapshot {
        nodes: vec![Node {
            node_id: "/node_id/1".into(),
            node_name: "db1-host".into(),
            address: "10.0.0.5".into(),
            ..Default::default()
        }],
        services: vec![Service {
            service_id: "/service_id/1".into(),
            service_name: "mysql-db1".into(),
            node_id: "/node_id/1".into(),
            ..Default::default()
        }],
        agents: vec![pmm_agent, mysqld],
        resolutions: MetricsResolutions::default(),
    }
}

pub fn settings(dir: &Path) -> Settings {
    Settings {
        scrape_config_path: dir.join("promscrape.yml"),
        base_config_path: dir.join("promscrape.base.yml"),
        component: "promsync".into(),
        server_jobs: vec![ServerJobConfig::engine_self_scrape()],
    }
}

/// Write an executable shell script standing in for the checker.
pub fn fake_checker(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("promtool");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// In-process checker with scripted verdicts.
pub struct FakeChecker {
    reject: Option<String>,
    fail_first: usize,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeChecker {
    pub fn accepting() -> Self {
        Self {
            reject: None,
            fail_first: 0,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject: Some(reason.to_string()),
            ..Self::accepting()
        }
    }

    /// Fail the first `n` checks with an infrastructure error.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigCheck for FakeChecker {
    async fn check(&self, _candidate: &CandidateBytes) -> Result<(), ReconcileError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if call < self.fail_first {
            return Err(ReconcileError::Infrastructure("checker unavailable".into()));
        }
        match &self.reject {
            Some(reason) => Err(ValidationError::Rejected(reason.clone()).into()),
            None => Ok(()),
        }
    }

    async fn version(&self) -> Result<String, ReconcileError> {
        Ok("fake 1.0".into())
    }
}

/// Reloader returning scripted results in order, then success.
/// `Err(code)` produces a `Status` error with body "reload failed".
pub struct ScriptedReloader {
    script: Mutex<VecDeque<Result<(), u16>>>,
    calls: AtomicUsize,
    ready: bool,
}

impl ScriptedReloader {
    pub fn new(script: Vec<Result<(), u16>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            ready: true,
        }
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reload for ScriptedReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next.map_err(|status| ReloadError::Status {
            status,
            body: "reload failed".into(),
        })
    }

    async fn is_ready(&self) -> Result<(), ReloadError> {
        if self.ready {
            Ok(())
        } else {
            Err(ReloadError::Transport("connection refused".into()))
        }
    }
}

#[derive(Clone)]
struct EngineState {
    status: Arc<AtomicU16>,
    reloads: Arc<AtomicUsize>,
}

/// HTTP server on an ephemeral port answering `/-/reload` and `/health`.
pub struct FakeEngine {
    addr: std::net::SocketAddr,
    state: EngineState,
}

impl FakeEngine {
    pub async fn start(reload_status: StatusCode) -> Self {
        let state = EngineState {
            status: Arc::new(AtomicU16::new(reload_status.as_u16())),
            reloads: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/-/reload", post(reload))
            .route("/health", get(|| async { "OK" }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn reloads(&self) -> usize {
        self.state.reloads.load(Ordering::SeqCst)
    }
}

async fn reload(State(state): State<EngineState>) -> (StatusCode, &'static str) {
    state.reloads.fetch_add(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_success() {
        (status, "")
    } else {
        (status, "reload failed")
    }
}
