//! Policy stores.
//!
//! The engine reads and writes its configuration through [`PolicyStore`], an
//! asynchronous key-value store with change notifications. Two implementations
//! are provided: [`MemoryPolicyStore`], which mirrors a browser profile's
//! synchronized storage area in process, and [`FilePolicyStore`], which
//! persists the record as JSON.
//!
//! License: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::errors::FormTamerError;
use crate::policy::{Policy, PolicyChange, PolicyPatch, STATE_KEY, SYNC_SCOPE};

pub type ChangeListener = Rc<dyn Fn(&PolicyChange)>;

/// Storage for the policy record.
#[async_trait(?Send)]
pub trait PolicyStore {
    /// Reads the current policy. Completes on a later turn.
    async fn read(&self) -> Result<Policy>;

    /// Merges `patch` into the stored policy and returns the result.
    ///
    /// The record is rewritten and listeners are notified even when the patch
    /// is empty, so an empty write forces a re-application.
    async fn write(&self, patch: PolicyPatch) -> Result<Policy>;

    /// Registers a listener for changes to any key in any scope.
    fn on_change(&self, listener: ChangeListener);
}

#[derive(Default)]
struct Listeners {
    inner: RefCell<Vec<ChangeListener>>,
}

impl Listeners {
    fn push(&self, listener: ChangeListener) {
        self.inner.borrow_mut().push(listener);
    }

    fn emit(&self, change: &PolicyChange) {
        let listeners: Vec<ChangeListener> = self.inner.borrow().clone();
        debug!("Emitting change {:?} to {} listener(s).", change, listeners.len());
        for listener in listeners {
            listener(change);
        }
    }
}

/// An in-process store organised in scopes, like a browser's storage areas.
#[derive(Default)]
pub struct MemoryPolicyStore {
    areas: RefCell<HashMap<String, Map<String, Value>>>,
    listeners: Listeners,
}

impl std::fmt::Debug for MemoryPolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPolicyStore")
            .field("areas", &self.areas.borrow())
            .finish()
    }
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose policy record starts as `policy`.
    pub fn with_policy(policy: Policy) -> Self {
        let store = Self::new();
        store.raw_set(SYNC_SCOPE, STATE_KEY, policy.to_record());
        store
    }

    /// Writes an arbitrary value, the way another extension page or a
    /// synchronised profile would, and notifies listeners.
    pub fn put_raw(&self, scope: &str, key: &str, value: Value) {
        self.raw_set(scope, key, value);
        self.listeners.emit(&PolicyChange::new(scope, &[key]));
    }

    fn raw_set(&self, scope: &str, key: &str, value: Value) {
        self.areas
            .borrow_mut()
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn record(&self) -> Option<Value> {
        self.areas
            .borrow()
            .get(SYNC_SCOPE)
            .and_then(|area| area.get(STATE_KEY).cloned())
    }
}

#[async_trait(?Send)]
impl PolicyStore for MemoryPolicyStore {
    async fn read(&self) -> Result<Policy> {
        tokio::task::yield_now().await;
        Ok(Policy::from_record(self.record().as_ref()))
    }

    async fn write(&self, patch: PolicyPatch) -> Result<Policy> {
        let next = self.read().await?.merged(&patch);
        self.raw_set(SYNC_SCOPE, STATE_KEY, next.to_record());
        self.listeners.emit(&PolicyChange::new(SYNC_SCOPE, &[STATE_KEY]));
        Ok(next)
    }

    fn on_change(&self, listener: ChangeListener) {
        self.listeners.push(listener);
    }
}

/// A store persisting `{ "formtamer_state": { ... } }` as pretty JSON.
///
/// Other top-level keys in the file are preserved on write.
pub struct FilePolicyStore {
    path: PathBuf,
    listeners: Listeners,
}

impl std::fmt::Debug for FilePolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePolicyStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FilePolicyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            listeners: Listeners::default(),
        }
    }

    /// `<config dir>/formtamer/policy.json`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("formtamer").join("policy.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_document(&self) -> Result<Map<String, Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Policy file {} does not exist yet.", self.path.display());
                return Ok(Map::new());
            }
            Err(e) => {
                return Err(FormTamerError::PolicyStore(format!(
                    "Failed to read policy file {}: {}",
                    self.path.display(),
                    e
                ))
                .into())
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                warn!(
                    "Policy file {} is not a JSON object; treating it as empty.",
                    self.path.display()
                );
                Ok(Map::new())
            }
        }
    }
}

#[async_trait(?Send)]
impl PolicyStore for FilePolicyStore {
    async fn read(&self) -> Result<Policy> {
        let document = self.load_document().await?;
        Ok(Policy::from_record(document.get(STATE_KEY)))
    }

    async fn write(&self, patch: PolicyPatch) -> Result<Policy> {
        let mut document = self.load_document().await?;
        let next = Policy::from_record(document.get(STATE_KEY)).merged(&patch);
        document.insert(STATE_KEY.to_string(), next.to_record());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(document))
            .context("Failed to serialize policy record")?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("Failed to write policy file {}", self.path.display()))?;
        info!("Saved policy to {}.", self.path.display());

        self.listeners.emit(&PolicyChange::new(SYNC_SCOPE, &[STATE_KEY]));
        Ok(next)
    }

    fn on_change(&self, listener: ChangeListener) {
        self.listeners.push(listener);
    }
}
