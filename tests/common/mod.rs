//! Shared fixtures for integration tests: an in-memory store and a scripted
//! execution backend that never touches a container daemon.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scanforge::config::RunnerConfig;
use scanforge::db::{MemoryStore, Store};
use scanforge::errors::AppError;
use scanforge::executor::{ExecutionBackend, ExecutorError, ExecutorResult, UnitContext};
use scanforge::models::analysis::{Analysis, AnalysisStatus};
use scanforge::models::repository::CreateRepository;
use scanforge::parsers::ParserRegistry;
use scanforge::services::orchestrator::Orchestrator;
use scanforge::services::runner::JobRunner;
use scanforge::services::{defaults, registration};

/// What a unit running a given image does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Terminates normally and prints this output.
    Output(String),
    /// Never terminates within the test timeout.
    Hang,
    /// Outlives its timeout immediately.
    Timeout,
    /// The unit cannot be created.
    CreateFails,
    /// The unit is created but refuses to start.
    StartFails,
    /// The image never shows up as loaded, however often it is pulled.
    NeverLoaded,
}

#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    units: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<String>>,
    created: AtomicUsize,
    pulls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the unit for security test `name` (image `huskyci/<name>:latest`).
    pub fn script(&self, name: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(format!("huskyci/{name}:latest"), script);
    }

    pub fn output(&self, name: &str, raw: &str) {
        self.script(name, Script::Output(raw.to_string()));
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Commands handed to `create_unit`, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn script_for(&self, image: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(image)
            .cloned()
            .unwrap_or_else(|| Script::Output(String::new()))
    }

    fn image_of(&self, execution_id: &str) -> ExecutorResult<String> {
        self.units
            .lock()
            .unwrap()
            .get(execution_id)
            .cloned()
            .ok_or_else(|| ExecutorError::Api {
                status: 404,
                message: format!("no such unit {execution_id}"),
            })
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn image_is_loaded(&self, image: &str) -> ExecutorResult<bool> {
        Ok(!matches!(self.script_for(image), Script::NeverLoaded))
    }

    async fn pull_image(&self, _image: &str) -> ExecutorResult<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_unit(
        &self,
        _ctx: &UnitContext,
        image: &str,
        command: &str,
    ) -> ExecutorResult<String> {
        if let Script::CreateFails = self.script_for(image) {
            return Err(ExecutorError::Api {
                status: 400,
                message: "invalid image reference".to_string(),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let id = format!("unit-{n}");
        self.units.lock().unwrap().insert(id.clone(), image.to_string());
        self.commands.lock().unwrap().push(command.to_string());
        Ok(id)
    }

    async fn start_unit(&self, execution_id: &str) -> ExecutorResult<()> {
        match self.script_for(&self.image_of(execution_id)?) {
            Script::StartFails => Err(ExecutorError::Api {
                status: 500,
                message: "cannot start container".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn wait_unit(&self, execution_id: &str, timeout: Duration) -> ExecutorResult<()> {
        match self.script_for(&self.image_of(execution_id)?) {
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExecutorError::Timeout(timeout))
            }
            Script::Timeout => Err(ExecutorError::Timeout(timeout)),
            _ => Ok(()),
        }
    }

    async fn read_output(&self, execution_id: &str) -> ExecutorResult<String> {
        match self.script_for(&self.image_of(execution_id)?) {
            Script::Output(raw) => Ok(raw),
            _ => Ok(String::new()),
        }
    }

    async fn ping(&self) -> ExecutorResult<()> {
        Ok(())
    }
}

pub const REPO_URL: &str = "https://github.com/acme/api.git";

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub backend: Arc<ScriptedBackend>,
    pub orchestrator: Arc<Orchestrator>,
}

/// A store seeded with the built-in tests, wired to a scripted backend.
pub async fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    defaults::ensure_defaults(store.as_ref()).await.unwrap();

    let backend = Arc::new(ScriptedBackend::new());
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        backend.clone(),
        Arc::new(ParserRegistry::with_defaults()),
        RunnerConfig {
            secret: "test-key".to_string(),
            pull_poll_interval: Duration::ZERO,
            pull_ceiling: Duration::ZERO,
        },
    ));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), runner));

    Harness {
        store,
        backend,
        orchestrator,
    }
}

impl Harness {
    pub async fn register(&self, url: &str, tests: &[&str]) {
        registration::register_repository(
            self.store.as_ref(),
            CreateRepository {
                url: url.to_string(),
                vm: None,
                security_test_names: tests.iter().map(|t| t.to_string()).collect(),
            },
        )
        .await
        .unwrap();
    }

    pub async fn admit(&self, url: &str) -> Result<uuid::Uuid, AppError> {
        self.orchestrator.admit(url).await
    }

    /// Poll the analysis until it finishes.
    pub async fn finished(&self, rid: uuid::Uuid) -> Analysis {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let analysis = self.orchestrator.status(rid).await.unwrap();
                if analysis.status == AnalysisStatus::Finished {
                    return analysis;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("analysis did not finish in time")
    }
}
