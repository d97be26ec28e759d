//! Load, mutate and persist named diagrams through a pluggable store.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::executor::{execute, execute_json, ExecutionReport, Instruction, ToolError};
use crate::ingest::{prepare, IngestReport};
use crate::{Diagram, GroupingOptions};

/// Persistence for named diagrams.
pub trait DiagramStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `None` when no diagram with that name has been saved.
    fn load(&self, name: &str) -> Result<Option<Diagram>, Self::Error>;
    fn save(&self, name: &str, diagram: &Diagram) -> Result<(), Self::Error>;
    fn list(&self) -> Result<Vec<String>, Self::Error>;
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    diagrams: Mutex<HashMap<String, Diagram>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagramStore for MemoryStore {
    type Error = Infallible;

    fn load(&self, name: &str) -> Result<Option<Diagram>, Self::Error> {
        let diagrams = self.diagrams.lock().unwrap_or_else(|e| e.into_inner());
        Ok(diagrams.get(name).cloned())
    }

    fn save(&self, name: &str, diagram: &Diagram) -> Result<(), Self::Error> {
        let mut diagrams = self.diagrams.lock().unwrap_or_else(|e| e.into_inner());
        diagrams.insert(name.to_string(), diagram.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, Self::Error> {
        let diagrams = self.diagrams.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = diagrams.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("diagram '{0}' does not exist")]
    Missing(String),

    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// A store plus the grouping options applied to diagrams entering it.
pub struct Session<S> {
    store: S,
    options: GroupingOptions,
}

impl<S: DiagramStore> Session<S> {
    pub fn new(store: S, options: GroupingOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &GroupingOptions {
        &self.options
    }

    pub fn list(&self) -> SessionResult<Vec<String>> {
        self.store.list().map_err(store_error)
    }

    pub fn load(&self, name: &str) -> SessionResult<Diagram> {
        self.store
            .load(name)
            .map_err(store_error)?
            .ok_or_else(|| SessionError::Missing(name.to_string()))
    }

    /// Normalize an externally produced diagram and store it under `name`, replacing any
    /// previous version.
    pub fn import(&self, name: &str, mut diagram: Diagram) -> SessionResult<(Diagram, IngestReport)> {
        let report = prepare(&mut diagram, &self.options);
        self.save(name, &diagram)?;
        Ok((diagram, report))
    }

    /// Run an instruction batch against a stored diagram (empty if absent).
    ///
    /// The result is saved even when the batch fails part way, so instructions that ran before
    /// the failure stay applied.
    pub fn apply(&self, name: &str, instructions: &[Instruction]) -> SessionResult<ExecutionReport> {
        self.run_batch(name, |d| execute(d, instructions))
    }

    /// Like [`Session::apply`], but takes the raw tool-call JSON and decodes each instruction
    /// just before running it.
    pub fn apply_json(&self, name: &str, instructions: Value) -> SessionResult<ExecutionReport> {
        self.run_batch(name, |d| execute_json(d, instructions))
    }

    fn run_batch(
        &self,
        name: &str,
        batch: impl FnOnce(&mut Diagram) -> Result<ExecutionReport, ToolError>,
    ) -> SessionResult<ExecutionReport> {
        let mut diagram = self.store.load(name).map_err(store_error)?.unwrap_or_default();
        let result = batch(&mut diagram);
        self.save(name, &diagram)?;
        if let Err(e) = &result {
            warn!(diagram = name, error = %e, "saved partially applied batch");
        }
        Ok(result?)
    }

    /// Run a single operation. The diagram is only saved if the operation succeeds.
    pub fn update<T>(
        &self,
        name: &str,
        op: impl FnOnce(&mut Diagram) -> Result<T, GraphError>,
    ) -> SessionResult<T> {
        let mut diagram = self.load(name)?;
        let value = op(&mut diagram)?;
        self.save(name, &diagram)?;
        Ok(value)
    }

    fn save(&self, name: &str, diagram: &Diagram) -> SessionResult<()> {
        self.store.save(name, diagram).map_err(store_error)?;
        debug!(diagram = name, nodes = diagram.nodes.len(), edges = diagram.edges.len(), "saved diagram");
        Ok(())
    }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> SessionError {
    SessionError::Store(Box::new(e))
}
