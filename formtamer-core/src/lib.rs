//! # formtamer-core
//!
//! `formtamer-core` is a page-level form policy engine. Attached to a live
//! document, it rewrites how that page's forms validate and submit according
//! to a small user policy:
//!
//! - **Pattern normalization** strips `/.../` delimiters that pages copy into
//!   `pattern` attributes by mistake.
//! - **Validation suppression** removes constraint attributes, sets
//!   `novalidate` and cancels `invalid` events.
//! - **Submit override** makes the page's validity checks always succeed and
//!   forces a blocked submission through, at most once per cooldown window.
//! - **Postcode hints** annotate postal-code fields with the local format for
//!   the page's country and normalize values on blur.
//!
//! The engine re-applies itself when the document changes (coalesced to one
//! pass per animation frame) and when the stored policy changes.
//!
//! ## Hosts
//!
//! The engine only talks to its page through the [`host::Document`] and
//! [`host::EventLoop`] traits. [`host::MemoryDocument`] and
//! [`host::TokioEventLoop`] are complete in-process implementations.
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use formtamer_core::host::{Document, EventLoop, MemoryDocument, TokioEventLoop};
//! use formtamer_core::orchestrator::Orchestrator;
//! use formtamer_core::store::{MemoryPolicyStore, PolicyStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     formtamer_core::logger::init_logger(None);
//!     let event_loop = TokioEventLoop::new();
//!     let doc = Rc::new(MemoryDocument::new("shop.example.nl"));
//!     let form = doc.append(doc.root(), "form", &[]);
//!     doc.append(form, "input", &[("name", "postcode"), ("pattern", "/[0-9]{4} ?[A-Z]{2}/")]);
//!
//!     let engine = Orchestrator::new(
//!         doc.clone() as Rc<dyn Document>,
//!         Rc::new(event_loop.clone()) as Rc<dyn EventLoop>,
//!         Rc::new(MemoryPolicyStore::new()) as Rc<dyn PolicyStore>,
//!     )?;
//!     let summary = event_loop.run_until(engine.start()).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```
//!
//! License: MIT OR APACHE 2.0

pub mod console;
pub mod engine;
pub mod errors;
pub mod host;
pub mod logger;
pub mod markers;
pub mod orchestrator;
pub mod policy;
pub mod rules;
pub mod scheduler;
pub mod stages;
pub mod store;

pub use console::{DebugConsole, CONSOLE_NAME};
pub use engine::{Pipeline, ScanContext, ScanSummary, Stage, StageReport};
pub use errors::FormTamerError;
pub use host::{Document, EventLoop, MemoryDocument, NodeId, TokioEventLoop};
pub use markers::{BoundFieldMarkers, Marker};
pub use orchestrator::Orchestrator;
pub use policy::{Feature, Policy, PolicyChange, PolicyPatch, PolicySnapshot, STATE_KEY, SYNC_SCOPE};
pub use scheduler::ScanScheduler;
pub use stages::postcode_hints::{HIGHLIGHT_DURATION, HINT_CLASS};
pub use stages::submit_override::{OverrideRecord, OverrideState, COOLDOWN};
pub use store::{FilePolicyStore, MemoryPolicyStore, PolicyStore};
