// formtamer-core/tests/common/mod.rs
#![allow(dead_code)]

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use log::LevelFilter;

use formtamer_core::host::{Document, EventLoop, MemoryDocument, TokioEventLoop, FRAME_INTERVAL};
use formtamer_core::orchestrator::Orchestrator;
use formtamer_core::policy::Policy;
use formtamer_core::store::{MemoryPolicyStore, PolicyStore};

pub fn init_logging() {
    formtamer_core::logger::init_logger(Some(LevelFilter::Debug));
}

/// A document, its event loop, an in-memory store and an engine bound to them.
pub struct Page {
    pub event_loop: TokioEventLoop,
    pub doc: Rc<MemoryDocument>,
    pub store: Rc<MemoryPolicyStore>,
    pub engine: Rc<Orchestrator>,
}

impl Page {
    pub fn new(host: &str, policy: Policy) -> Result<Self> {
        Self::with_document(MemoryDocument::new(host), policy)
    }

    /// Builds the page around an already populated document, so capabilities
    /// can be withdrawn before the engine sees it.
    pub fn with_document(doc: MemoryDocument, policy: Policy) -> Result<Self> {
        init_logging();
        let event_loop = TokioEventLoop::new();
        let doc = Rc::new(doc);
        let store = Rc::new(MemoryPolicyStore::with_policy(policy));
        let engine = Orchestrator::new(
            doc.clone() as Rc<dyn Document>,
            Rc::new(event_loop.clone()) as Rc<dyn EventLoop>,
            store.clone() as Rc<dyn PolicyStore>,
        )?;
        Ok(Self { event_loop, doc, store, engine })
    }

    /// `<html><body><form>...` with the given fields. Returns (form, fields).
    pub fn form_with(&self, fields: &[&[(&str, &str)]]) -> (formtamer_core::NodeId, Vec<formtamer_core::NodeId>) {
        let body = self.doc.append(self.doc.root(), "body", &[]);
        let form = self.doc.append(body, "form", &[("action", "/checkout")]);
        let ids = fields
            .iter()
            .map(|attrs| self.doc.append(form, "input", attrs))
            .collect();
        (form, ids)
    }
}

pub fn everything_on() -> Policy {
    Policy {
        enabled: true,
        normalize_patterns: true,
        suppress_validation: true,
        override_submit: true,
        show_postcode_hints: true,
    }
}

/// Lets every task that is ready on the current turn run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Waits until a frame-aligned re-scan requested now has run.
pub async fn next_frame() {
    tokio::time::sleep(FRAME_INTERVAL + Duration::from_millis(2)).await;
}
