//! Wires the policy store, the stage pipeline, the scheduler and the document
//! together.
//!
//! A cycle reads the policy, captures a [`PolicySnapshot`] and, if the master
//! switch is on, runs the pipeline over the whole document. The first enabled
//! cycle also installs the single document-wide mutation observer, whose
//! notifications go through the [`ScanScheduler`]. Policy changes in the
//! synchronized scope trigger a fresh cycle.
//!
//! License: MIT OR APACHE 2.0

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::console::DebugConsole;
use crate::engine::{Pipeline, ScanContext, ScanSummary, Stage};
use crate::errors::FormTamerError;
use crate::host::{Document, EventLoop, MutationRecord, NodeId};
use crate::markers::BoundFieldMarkers;
use crate::policy::{PolicyChange, PolicySnapshot};
use crate::scheduler::ScanScheduler;
use crate::stages::pattern_normalizer::normalize_patterns;
use crate::stages::validation_suppressor::suppress_validation;
use crate::stages::{PatternNormalizer, PostcodeHints, SubmitOverrideMachine, ValidationSuppressor};
use crate::store::PolicyStore;

pub struct Orchestrator {
    doc: Rc<dyn Document>,
    event_loop: Rc<dyn EventLoop>,
    store: Rc<dyn PolicyStore>,
    pipeline: Pipeline,
    markers: BoundFieldMarkers,
    submit: Rc<SubmitOverrideMachine>,
    current: RefCell<Option<PolicySnapshot>>,
    scheduler: ScanScheduler,
    observer_installed: Cell<bool>,
    subscribed: Cell<bool>,
    cycles: Cell<usize>,
    last_applied: Cell<Option<DateTime<Utc>>>,
    this: Weak<Orchestrator>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.pipeline.stage_names())
            .field("current", &self.current.borrow())
            .field("observer_installed", &self.observer_installed.get())
            .field("cycles", &self.cycles.get())
            .finish()
    }
}

impl Orchestrator {
    /// Builds the engine for one document. Nothing touches the document until
    /// [`Orchestrator::start`] or [`Orchestrator::apply`] is called.
    pub fn new(
        doc: Rc<dyn Document>,
        event_loop: Rc<dyn EventLoop>,
        store: Rc<dyn PolicyStore>,
    ) -> Result<Rc<Self>, FormTamerError> {
        let submit = SubmitOverrideMachine::new();
        let hints = PostcodeHints::new()?;

        let mut stages: Vec<Rc<dyn Stage>> = Vec::with_capacity(4);
        stages.push(Rc::new(PatternNormalizer));
        stages.push(Rc::new(ValidationSuppressor));
        stages.push(submit.clone());
        stages.push(Rc::new(hints));

        Ok(Rc::new_cyclic(|this: &Weak<Orchestrator>| {
            let weak = this.clone();
            let rescan: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.rescan();
                }
            });
            Orchestrator {
                scheduler: ScanScheduler::new(event_loop.clone(), rescan),
                doc,
                event_loop,
                store,
                pipeline: Pipeline::new(stages),
                markers: BoundFieldMarkers::new(),
                submit,
                current: RefCell::new(None),
                observer_installed: Cell::new(false),
                subscribed: Cell::new(false),
                cycles: Cell::new(0),
                last_applied: Cell::new(None),
                this: this.clone(),
            }
        }))
    }

    /// Subscribes to policy changes and runs the first cycle.
    pub async fn start(&self) -> Result<ScanSummary> {
        self.subscribe();
        self.apply().await
    }

    /// Registers the policy-change listener. Later calls do nothing.
    pub fn subscribe(&self) {
        if self.subscribed.replace(true) {
            return;
        }
        let weak = self.this.clone();
        self.store.on_change(Rc::new(move |change: &PolicyChange| {
            if !change.concerns_policy() {
                debug!("Ignoring storage change in scope '{}'.", change.scope);
                return;
            }
            let Some(orchestrator) = weak.upgrade() else { return };
            info!("Policy changed; re-applying.");
            let task = orchestrator.clone();
            orchestrator.event_loop.spawn(Box::pin(async move {
                if let Err(e) = task.apply().await {
                    warn!("Re-application after policy change failed: {:#}", e);
                }
            }));
        }));
    }

    /// Runs one full application cycle with a freshly read policy.
    pub async fn apply(&self) -> Result<ScanSummary> {
        let policy = self
            .store
            .read()
            .await
            .context("Failed to read the policy")?;
        let snapshot = PolicySnapshot::capture(policy, &self.doc.host_name());
        *self.current.borrow_mut() = Some(snapshot.clone());

        if !policy.enabled {
            debug!("FormTamer is disabled for {}.", self.doc.host_name());
            return Ok(ScanSummary::default());
        }

        let summary = self.run_cycle(&snapshot, self.doc.root());
        self.install_observer();
        Ok(summary)
    }

    /// Re-runs the pipeline over the whole document with the latest snapshot.
    pub fn rescan(&self) -> ScanSummary {
        let Some(snapshot) = self.current.borrow().clone() else {
            return ScanSummary::default();
        };
        if !snapshot.policy.enabled {
            return ScanSummary::default();
        }
        self.markers.prune(self.doc.as_ref());
        self.submit.prune(self.doc.as_ref());
        self.run_cycle(&snapshot, self.doc.root())
    }

    fn run_cycle(&self, snapshot: &PolicySnapshot, root: NodeId) -> ScanSummary {
        let ctx = ScanContext {
            doc: &self.doc,
            event_loop: &self.event_loop,
            markers: &self.markers,
            snapshot,
            root,
        };
        let summary = self.pipeline.run(&ctx);
        let cycle = self.cycles.get() + 1;
        self.cycles.set(cycle);
        self.last_applied.set(Some(Utc::now()));
        debug!("Cycle {} over {}: {}", cycle, root, summary);
        summary
    }

    fn install_observer(&self) {
        if self.observer_installed.replace(true) {
            return;
        }
        let weak = self.this.clone();
        let callback = Rc::new(move |records: &[MutationRecord]| {
            if let Some(orchestrator) = weak.upgrade() {
                debug!("Observed {} mutation record(s).", records.len());
                orchestrator.scheduler.notify();
            }
        });
        match self.doc.observe_mutations(self.doc.root(), callback) {
            Ok(()) => info!("Watching {} for inserted forms.", self.doc.host_name()),
            Err(e) => debug!("Mutation observation unavailable: {}", e),
        }
    }

    /// Forces a pattern-normalization pass over the whole document.
    pub fn normalize_patterns_now(&self) -> usize {
        normalize_patterns(self.doc.as_ref(), self.doc.root())
    }

    /// Forces a validation-suppression pass over the whole document.
    pub fn suppress_validation_now(&self) -> usize {
        suppress_validation(self.doc.as_ref(), &self.markers, self.doc.root())
    }

    pub fn console(&self) -> DebugConsole {
        DebugConsole::new(self.this.clone(), self.store.clone())
    }

    pub fn store(&self) -> &Rc<dyn PolicyStore> {
        &self.store
    }

    pub fn snapshot(&self) -> Option<PolicySnapshot> {
        self.current.borrow().clone()
    }

    pub fn markers(&self) -> &BoundFieldMarkers {
        &self.markers
    }

    pub fn submit_machine(&self) -> &Rc<SubmitOverrideMachine> {
        &self.submit
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    /// Number of pipeline cycles that actually ran.
    pub fn cycles(&self) -> usize {
        self.cycles.get()
    }

    pub fn last_applied(&self) -> Option<DateTime<Utc>> {
        self.last_applied.get()
    }

    pub fn observer_installed(&self) -> bool {
        self.observer_installed.get()
    }

    pub fn rescan_pending(&self) -> bool {
        self.scheduler.is_pending()
    }
}
