//! Process-scoped wiring of the mock pipeline.
//!
//! `MockEngine` is created once at start-up and shared by the HTTP listener
//! and the administrative endpoints. It owns the registry, the key-value
//! store, the script pool, the action scheduler and the global delay.

use crate::actions::ActionScheduler;
use crate::config::{Config, NotFoundConfig};
use crate::matcher::find_match;
use crate::mock::{
    loader, CompileContext, CompiledMock, LoadError, MockDefinition, MockRegistry, MockSnapshot,
    PatchError,
};
use crate::request::MockRequest;
use crate::response::{
    default_content_type, DelayRequest, GlobalDelay, MockResponse, ResponseBuilder,
};
use crate::scripting::{Hook, ScriptPool, ScriptPoolConfig, ScriptSource};
use crate::store::KeyValueStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a successful reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub generation: u64,
    pub mocks: usize,
}

pub struct MockEngine {
    registry: MockRegistry,
    store: Arc<dyn KeyValueStore>,
    pool: Arc<ScriptPool>,
    builder: ResponseBuilder,
    scheduler: ActionScheduler,
    delay: Arc<GlobalDelay>,
    mocks_dir: PathBuf,
    not_found: NotFoundConfig,
    /// Serializes reloads and patches; readers never take it
    writer: tokio::sync::Mutex<()>,
}

impl MockEngine {
    /// Build an engine with an empty registry. Call [`MockEngine::reload`] to
    /// load the mocks directory.
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let pool = Arc::new(ScriptPool::new(
            ScriptPoolConfig::from(&config.scripting),
            Arc::clone(&store),
        )?);
        let delay = Arc::new(GlobalDelay::new());
        let scheduler =
            ActionScheduler::new(Duration::from_millis(config.actions.default_timeout_ms))?;

        Ok(Self {
            registry: MockRegistry::new(CompileContext::new(
                &config.core.bodies_dir,
                &config.core.functions_dir,
            )),
            store,
            builder: ResponseBuilder::new(Arc::clone(&pool), Arc::clone(&delay)),
            pool,
            scheduler,
            delay,
            mocks_dir: config.core.mocks_dir.clone(),
            not_found: config.not_found.clone(),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// Match, build, then fire the mock's actions
    pub async fn handle(&self, request: MockRequest) -> MockResponse {
        let snapshot = self.registry.current();

        let Some(matched) = find_match(&snapshot, &request) else {
            debug!("No mock matches {} {}", request.method, request.url());
            return self.not_found_response();
        };
        debug!(
            "{} {} matched mock {} (generation {})",
            request.method,
            request.url(),
            matched.mock.name,
            snapshot.generation()
        );

        let built = self.builder.build(&matched, &request).await;

        if !matched.mock.actions.is_empty() {
            self.scheduler
                .schedule(&matched.mock.actions, &built.helpers, &matched.mock.name);
        }

        built.response
    }

    fn not_found_response(&self) -> MockResponse {
        MockResponse::new(self.not_found.status, self.not_found.body.clone())
            .with_header("Content-Type", default_content_type(&self.not_found.body))
    }

    /// Re-read the mocks directory. On failure the live snapshot is untouched.
    pub async fn reload(&self) -> Result<ReloadSummary, LoadError> {
        let _writer = self.writer.lock().await;

        let definitions = loader::load_directory(&self.mocks_dir)?;
        let summary = self.install(definitions).await?;
        info!(
            "Loaded {} mocks from {} (generation {})",
            summary.mocks,
            self.mocks_dir.display(),
            summary.generation
        );
        Ok(summary)
    }

    /// Replace the live mocks with caller-supplied definitions
    pub async fn load_definitions(
        &self,
        definitions: Vec<MockDefinition>,
    ) -> Result<ReloadSummary, LoadError> {
        let _writer = self.writer.lock().await;
        self.install(definitions).await
    }

    async fn install(&self, definitions: Vec<MockDefinition>) -> Result<ReloadSummary, LoadError> {
        let mut compiled = self.registry.compile(definitions)?;
        self.run_setups(&mut compiled).await;

        let snapshot = self
            .registry
            .publish(compiled.into_iter().map(Arc::new).collect());
        Ok(ReloadSummary {
            generation: snapshot.generation(),
            mocks: snapshot.len(),
        })
    }

    /// Deep-merge a partial definition into the named mock and republish.
    ///
    /// Returns the patched definition.
    pub async fn patch(&self, patch: Value) -> Result<Value, PatchError> {
        let Value::Object(fields) = &patch else {
            return Err(PatchError::NotAnObject);
        };
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .ok_or(PatchError::MissingName)?
            .to_string();

        let _writer = self.writer.lock().await;
        let snapshot = self.registry.current();

        let Some(position) = snapshot.mocks().iter().position(|m| m.name == name) else {
            return Err(PatchError::UnknownMock {
                name,
                known: snapshot.names(),
            });
        };

        let mut merged = (*snapshot.mocks()[position].definition).clone();
        merge_json(&mut merged, &patch);
        let definition: MockDefinition =
            serde_json::from_value(merged).map_err(|e| PatchError::Invalid(e.to_string()))?;

        let mut compiled = self.registry.compile(vec![definition])?;
        self.run_setups(&mut compiled).await;
        let Some(replacement) = compiled.pop() else {
            return Err(PatchError::Invalid("patch produced no mock".to_string()));
        };

        let patched = Arc::clone(&replacement.definition);
        let mut mocks = snapshot.mocks().to_vec();
        mocks[position] = Arc::new(replacement);
        let published = self.registry.publish(mocks);

        info!(
            "Patched mock {} (generation {})",
            name,
            published.generation()
        );
        Ok((*patched).clone())
    }

    /// Run `setup()` once per distinct script file. Mocks whose setup failed
    /// are published with their script disabled.
    async fn run_setups(&self, mocks: &mut [CompiledMock]) {
        let mut scripts: Vec<Arc<ScriptSource>> = Vec::new();
        for script in mocks.iter().filter_map(|m| m.script.as_ref()) {
            if !scripts.iter().any(|s| s.path == script.path) {
                scripts.push(Arc::clone(script));
            }
        }

        let mut failed: HashSet<PathBuf> = HashSet::new();
        for script in scripts {
            match self.pool.execute(Arc::clone(&script), Hook::Setup).await {
                Ok(outcome) => debug!("setup() of {}: {:?}", script.name, outcome),
                Err(e) => {
                    warn!("setup() of {} failed, disabling the script: {}", script.name, e);
                    failed.insert(script.path.clone());
                }
            }
        }

        if failed.is_empty() {
            return;
        }
        for mock in mocks.iter_mut() {
            if mock
                .script
                .as_ref()
                .is_some_and(|s| failed.contains(&s.path))
            {
                mock.script = None;
            }
        }
    }

    pub fn snapshot(&self) -> Arc<MockSnapshot> {
        self.registry.current()
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Empty the key-value store, returning how many keys were dropped
    pub fn clear_store(&self) -> usize {
        let cleared = self.store.clear();
        info!("Cleared {} keys from the store", cleared);
        cleared
    }

    pub fn set_delay(&self, request: DelayRequest) {
        info!(
            "Global delay of {} ms for the next {} ms",
            request.min_response_time, request.duration
        );
        self.delay.set(request);
    }

    pub fn mocks_dir(&self) -> &Path {
        &self.mocks_dir
    }
}

/// Objects merge key by key; any other patch value replaces the target
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
