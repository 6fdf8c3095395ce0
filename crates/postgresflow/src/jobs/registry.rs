//! The Job Registry: a process-wide, explicit mapping from a handler
//! blob's class-name string to a constructor for a concrete job. This
//! replaces the source ecosystem's metaclass auto-registration (every
//! class registers itself on definition) with a plain map built once at
//! startup.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A concrete job implementation. Only `run` is required; the rest have
/// no-op defaults, mirroring the source's optional-override hooks
/// (`before`/`after`/`success`/`error`/`failure`) re-cast as a capability
/// interface instead of an inheritance hierarchy.
pub trait Job: Send {
    fn before(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn run(&mut self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn after(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn success(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn error(&mut self, _message: &str) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn failure(&mut self, _message: &str) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

pub type JobConstructor =
    Arc<dyn Fn(i64, Value) -> anyhow::Result<Box<dyn Job>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct JobRegistry {
    constructors: Arc<RwLock<HashMap<String, JobConstructor>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is explicit and only expected at startup; lookups are
    /// read-only afterward. Global state like this registry is initialized
    /// once and never mutated again.
    pub fn register<F>(&self, class_name: impl Into<String>, ctor: F)
    where
        F: Fn(i64, Value) -> anyhow::Result<Box<dyn Job>> + Send + Sync + 'static,
    {
        let mut guard = self.constructors.write().expect("registry lock poisoned");
        guard.insert(class_name.into(), Arc::new(ctor));
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.constructors
            .read()
            .expect("registry lock poisoned")
            .contains_key(class_name)
    }

    pub fn construct(
        &self,
        class_name: &str,
        job_id: i64,
        attributes: Value,
    ) -> Option<anyhow::Result<Box<dyn Job>>> {
        let ctor = self
            .constructors
            .read()
            .expect("registry lock poisoned")
            .get(class_name)
            .cloned()?;
        Some(ctor(job_id, attributes))
    }
}
