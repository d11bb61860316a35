//! The narrow interface between the engine and its host page.
//!
//! The engine never owns the document. Everything it reads or mutates goes
//! through [`Document`], and every asynchronous boundary (animation frames,
//! next-turn callbacks, timers, policy reads) goes through [`EventLoop`].
//! Both are single-threaded by contract, so handles are `Rc` and all methods
//! take `&self`: listeners registered by the engine re-enter the document while
//! the page is dispatching events.
//!
//! License: MIT OR APACHE 2.0

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::HostResult;

pub mod memory;
pub mod tokio_loop;

pub use memory::{Capability, MemoryDocument, SubmitOutcome};
pub use tokio_loop::{TokioEventLoop, FRAME_INTERVAL};

/// Identity of a node within one document.
///
/// Hosts must never hand out the same id twice during a document's lifetime,
/// which is what lets identity-keyed sets stand in for per-element markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events the engine listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Submit,
    Invalid,
    Blur,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Submit => "submit",
            EventKind::Invalid => "invalid",
            EventKind::Blur => "blur",
        }
    }

    /// Whether the event propagates back up through the ancestors.
    pub fn bubbles(&self) -> bool {
        matches!(self, EventKind::Submit)
    }
}

#[derive(Debug)]
struct EventInner {
    kind: EventKind,
    target: NodeId,
    default_prevented: Cell<bool>,
}

/// A dispatched event. Cloning shares the same underlying event, so a clone
/// kept past dispatch observes `preventDefault` calls made by later listeners.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Rc<EventInner>,
}

impl Event {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            inner: Rc::new(EventInner {
                kind,
                target,
                default_prevented: Cell::new(false),
            }),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.inner.kind
    }

    pub fn target(&self) -> NodeId {
        self.inner.target
    }

    pub fn prevent_default(&self) {
        self.inner.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.get()
    }
}

pub type EventListener = Rc<dyn Fn(&Event)>;

/// One childList change reported by the mutation-observation primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

pub type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

/// The host document as seen by the engine.
pub trait Document {
    /// The document element; scans of "the whole document" start here.
    fn root(&self) -> NodeId;

    /// Host name of the page location (for example `shop.example.nl`).
    fn host_name(&self) -> String;

    /// `root` and all of its descendants, in tree order.
    fn subtree(&self, root: NodeId) -> Vec<NodeId>;

    /// Whether `node` is currently attached to the document.
    fn contains(&self, node: NodeId) -> bool;

    /// Whether the host still holds `node` at all. Detached nodes still exist
    /// and may be inserted again; destroyed ones never come back.
    fn exists(&self, node: NodeId) -> bool;

    /// Lowercase tag name, or `None` for unknown nodes.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);
    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Current value of a field.
    fn value(&self, node: NodeId) -> String;
    fn set_value(&self, node: NodeId, value: &str);

    /// Creates a detached element.
    fn create_element(&self, tag: &str) -> NodeId;
    fn set_text_content(&self, node: NodeId, text: &str);

    /// Inserts `node` as the next sibling of `reference`.
    fn insert_after(&self, reference: NodeId, node: NodeId) -> HostResult<()>;

    fn add_event_listener(
        &self,
        node: NodeId,
        kind: EventKind,
        capture: bool,
        listener: EventListener,
    );

    /// The page-facing custom-validity setter. Subject to the validity override.
    fn set_custom_validity(&self, node: NodeId, message: &str) -> HostResult<()>;

    /// Replaces the page-facing validity predicates with ones that always
    /// report success and neutralizes the custom-validity setter of text
    /// fields. Never reverted.
    fn install_validity_override(&self) -> HostResult<()>;

    /// Submits `form` without dispatching a submit event.
    fn native_submit(&self, form: NodeId) -> HostResult<()>;

    /// Registers a childList observer over the subtree of `root`.
    fn observe_mutations(&self, root: NodeId, callback: MutationCallback) -> HostResult<()>;
}

pub type Task = Box<dyn FnOnce()>;
pub type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// The host's cooperative scheduling primitives.
pub trait EventLoop {
    /// Runs `task` on the next animation-frame-aligned tick.
    fn request_animation_frame(&self, task: Task);

    /// Runs `task` on a later turn, after the current dispatch has completed.
    fn defer(&self, task: Task);

    fn set_timeout(&self, delay: Duration, task: Task);

    /// Drives a future on this loop.
    fn spawn(&self, future: LocalFuture);

    fn now(&self) -> Instant;
}

const FIELD_TAGS: &[&str] = &["input", "select", "textarea"];

/// Whether `node` is an input/select/textarea control.
pub fn is_field(doc: &dyn Document, node: NodeId) -> bool {
    doc.tag_name(node)
        .map_or(false, |tag| FIELD_TAGS.contains(&tag.as_str()))
}

/// Whether `node` is one of `tags`.
pub fn has_tag(doc: &dyn Document, node: NodeId, tags: &[&str]) -> bool {
    doc.tag_name(node)
        .map_or(false, |tag| tags.contains(&tag.as_str()))
}

/// All nodes under `root` (inclusive) whose tag is one of `tags`.
pub fn select(doc: &dyn Document, root: NodeId, tags: &[&str]) -> Vec<NodeId> {
    doc.subtree(root)
        .into_iter()
        .filter(|node| has_tag(doc, *node, tags))
        .collect()
}
