//! The submit-override state machine.
//!
//! Makes the page's own validity checks always succeed while still letting a
//! blocked submission happen, at most once per cooldown window, per form:
//!
//! ```text
//! Idle --submit, deferred check sees defaultPrevented--> Submitting
//! Submitting --native submit invoked--> Cooldown { until }
//! Cooldown --timer--> Idle
//! ```
//!
//! The submit listener never acts during dispatch. It defers its decision to
//! the next turn so every other submit handler has run and the event's
//! default action has either happened or been cancelled. Only a cancelled
//! event is pushed through the native submission primitive, which does not
//! dispatch a submit event and therefore cannot re-enter this listener.
//!
//! The deferred check only sees that the event was cancelled, not who
//! cancelled it or why. A page handler that cancels the event to submit by
//! itself (an XHR or fetch submission, a multi-step wizard) looks the same as
//! one that rejected the input. Such forms are force-submitted too, once per
//! cooldown window, so the page's own submission and the native one can both
//! go out. Leaving the override off is the only way to avoid that on those
//! pages.
//!
//! License: MIT OR APACHE 2.0

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::engine::{ScanContext, Stage, StageReport};
use crate::host::{select, Document, Event, EventKind, EventListener, EventLoop, NodeId};
use crate::markers::Marker;
use crate::policy::Feature;
use crate::stages::validation_suppressor::mark_novalidate;

const TARGET: &str = "formtamer_core::submit";

/// Window after a bypass submission during which further submits of the same
/// form are ignored.
pub const COOLDOWN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideState {
    Idle,
    Submitting,
    Cooldown { until: Instant },
}

/// Per-form bookkeeping, created when the listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideRecord {
    pub state: OverrideState,
    pub patched_at: Instant,
}

impl OverrideRecord {
    /// Whether a bypass submission is in flight or cooling down.
    pub fn submitting(&self) -> bool {
        self.state != OverrideState::Idle
    }
}

/// The process-wide validity override, installed at most once.
///
/// The attempt flag is raised before the install is tried, so a host that
/// lacks the capability is not asked again.
#[derive(Debug, Default)]
pub struct CapabilityOverride {
    attempted: Cell<bool>,
    installed: Cell<bool>,
}

impl CapabilityOverride {
    /// Installs the override if this is the first call. Returns true only for
    /// the call that performed a successful install.
    pub fn ensure_installed(&self, doc: &dyn Document) -> bool {
        if self.attempted.replace(true) {
            return false;
        }
        match doc.install_validity_override() {
            Ok(()) => {
                info!(target: TARGET, "Installed validity override.");
                self.installed.set(true);
                true
            }
            Err(e) => {
                debug!(target: TARGET, "Validity override unavailable: {}", e);
                false
            }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempted.get()
    }
}

pub struct SubmitOverrideMachine {
    records: RefCell<HashMap<NodeId, OverrideRecord>>,
    capability: CapabilityOverride,
    cooldown: Duration,
    this: Weak<SubmitOverrideMachine>,
}

impl std::fmt::Debug for SubmitOverrideMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitOverrideMachine")
            .field("records", &self.records.borrow().len())
            .field("capability", &self.capability)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl SubmitOverrideMachine {
    pub fn new() -> Rc<Self> {
        Self::with_cooldown(COOLDOWN)
    }

    pub fn with_cooldown(cooldown: Duration) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            records: RefCell::new(HashMap::new()),
            capability: CapabilityOverride::default(),
            cooldown,
            this: this.clone(),
        })
    }

    /// Current state of `form`. Forms without a record are `Idle`.
    pub fn state(&self, form: NodeId) -> OverrideState {
        self.record(form).map_or(OverrideState::Idle, |r| r.state)
    }

    pub fn record(&self, form: NodeId) -> Option<OverrideRecord> {
        self.records.borrow().get(&form).copied()
    }

    pub fn record_count(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn capability_installed(&self) -> bool {
        self.capability.is_installed()
    }

    /// Drops records of forms the host has destroyed. Detached forms keep theirs.
    pub fn prune(&self, doc: &dyn Document) -> usize {
        let mut records = self.records.borrow_mut();
        let before = records.len();
        records.retain(|form, _| doc.exists(*form));
        before - records.len()
    }

    /// Installs the validity override and binds every unbound form under `ctx.root`.
    pub fn attach(&self, ctx: &ScanContext<'_>) -> usize {
        let doc = ctx.doc.as_ref();
        self.capability.ensure_installed(doc);

        let mut attached = 0;
        for form in select(doc, ctx.root, &["form"]) {
            if !ctx.markers.bind(Marker::SubmitBypass, form) {
                continue;
            }
            mark_novalidate(doc, form);
            self.records.borrow_mut().insert(
                form,
                OverrideRecord {
                    state: OverrideState::Idle,
                    patched_at: ctx.event_loop.now(),
                },
            );
            doc.add_event_listener(form, EventKind::Submit, true, self.listener(ctx, form));
            attached += 1;
        }
        if attached > 0 {
            debug!(target: TARGET, "Bound submit override to {} form(s).", attached);
        }
        attached
    }

    fn listener(&self, ctx: &ScanContext<'_>, form: NodeId) -> EventListener {
        let machine = self.this.clone();
        let doc = Rc::downgrade(ctx.doc);
        let event_loop = ctx.event_loop.clone();
        Rc::new(move |event: &Event| {
            let Some(this) = machine.upgrade() else { return };
            if this.is_busy(form) {
                debug!(target: TARGET, "Ignoring submit of {} while {:?}.", form, this.state(form));
                return;
            }
            let event = event.clone();
            let machine = machine.clone();
            let doc = doc.clone();
            let deferred_loop = event_loop.clone();
            event_loop.defer(Box::new(move || {
                if let (Some(this), Some(doc)) = (machine.upgrade(), doc.upgrade()) {
                    this.deferred_check(doc.as_ref(), deferred_loop.as_ref(), form, &event);
                }
            }));
        })
    }

    fn is_busy(&self, form: NodeId) -> bool {
        self.record(form).map_or(false, |r| r.submitting())
    }

    fn set_state(&self, form: NodeId, state: OverrideState) {
        if let Some(record) = self.records.borrow_mut().get_mut(&form) {
            record.state = state;
        }
    }

    fn deferred_check(&self, doc: &dyn Document, event_loop: &dyn EventLoop, form: NodeId, event: &Event) {
        if self.is_busy(form) {
            debug!(target: TARGET, "Deferred check for {} found it {:?}.", form, self.state(form));
            return;
        }
        if !event.default_prevented() {
            debug!(target: TARGET, "Submit of {} was not cancelled; leaving it to the browser.", form);
            return;
        }

        self.set_state(form, OverrideState::Submitting);
        match doc.native_submit(form) {
            Ok(()) => debug!(target: TARGET, "Forced native submission of {}.", form),
            Err(e) => debug!(target: TARGET, "Native submission of {} failed: {}", form, e),
        }

        let until = event_loop.now() + self.cooldown;
        self.set_state(form, OverrideState::Cooldown { until });
        let machine = self.this.clone();
        event_loop.set_timeout(
            self.cooldown,
            Box::new(move || {
                if let Some(this) = machine.upgrade() {
                    this.release(form);
                }
            }),
        );
    }

    fn release(&self, form: NodeId) {
        if let Some(record) = self.records.borrow_mut().get_mut(&form) {
            if matches!(record.state, OverrideState::Cooldown { .. }) {
                record.state = OverrideState::Idle;
            }
        }
    }
}

impl Stage for SubmitOverrideMachine {
    fn name(&self) -> &'static str {
        "submit_override"
    }

    fn feature(&self) -> Feature {
        Feature::OverrideSubmit
    }

    fn apply(&self, ctx: &ScanContext<'_>) -> StageReport {
        StageReport {
            stage: self.name(),
            touched: self.attach(ctx),
        }
    }
}
