//! An in-memory [`Document`] with just enough native behavior to host the engine.
//!
//! It models element trees, attributes and field values, capture/bubble
//! listener dispatch, childList mutation records, the browser's interactive
//! validation before submit, the page-facing validity predicates (and their
//! override), and a log of native submissions. Individual capabilities can be
//! switched off to emulate a degraded host.
//!
//! Constraint checking is deliberately small: `required`, `pattern`,
//! `minlength`/`maxlength`, numeric `min`/`max` and custom validity messages.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use regex::Regex;

use crate::errors::{FormTamerError, HostResult};
use crate::host::{
    Document, Event, EventKind, EventListener, MutationCallback, MutationRecord, NodeId,
};

/// Host capabilities that can be withdrawn to emulate a restricted environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CustomValidity,
    ValidityOverride,
    NativeSubmit,
    MutationObserver,
}

impl Capability {
    fn name(&self) -> &'static str {
        match self {
            Capability::CustomValidity => "setCustomValidity",
            Capability::ValidityOverride => "validity override",
            Capability::NativeSubmit => "HTMLFormElement.submit",
            Capability::MutationObserver => "MutationObserver",
        }
    }
}

/// What happened when the user tried to submit a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Interactive validation failed; no submit event was dispatched.
    BlockedByValidation,
    /// A listener cancelled the submit event.
    Prevented,
    /// The browser performed the native submission.
    Submitted,
}

struct RegisteredListener {
    kind: EventKind,
    capture: bool,
    listener: EventListener,
}

#[derive(Default)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    value: String,
    text: String,
    custom_validity: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<RegisteredListener>,
}

struct DocState {
    nodes: HashMap<NodeId, NodeData>,
    next_id: u64,
    root: NodeId,
    host: String,
    observers: Vec<(NodeId, MutationCallback)>,
    validity_overridden: bool,
    override_installs: usize,
    submissions: Vec<NodeId>,
    validation_bubbles: usize,
    disabled: HashSet<Capability>,
}

impl DocState {
    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeData {
                tag: tag.to_ascii_lowercase(),
                ..Default::default()
            },
        );
        id
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(id) = current {
            chain.push(id);
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        chain
    }

    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&node)?.parent.take()?;
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
        Some(parent)
    }

    fn observers_for(&self, target: NodeId) -> Vec<MutationCallback> {
        let mut chain = self.ancestors(target);
        chain.push(target);
        self.observers
            .iter()
            .filter(|(root, _)| chain.contains(root))
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    fn require(&self, capability: Capability) -> HostResult<()> {
        if self.disabled.contains(&capability) {
            Err(FormTamerError::Unsupported(capability.name()))
        } else {
            Ok(())
        }
    }
}

/// A small DOM for embedding and tests. See the module docs.
pub struct MemoryDocument {
    state: RefCell<DocState>,
}

impl std::fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryDocument")
            .field("host", &state.host)
            .field("nodes", &state.nodes.len())
            .field("submissions", &state.submissions.len())
            .finish()
    }
}

impl MemoryDocument {
    /// Creates a document with an `html` root element for a page on `host`.
    pub fn new(host: &str) -> Self {
        let mut state = DocState {
            nodes: HashMap::new(),
            next_id: 1,
            root: NodeId(0),
            host: host.to_string(),
            observers: Vec::new(),
            validity_overridden: false,
            override_installs: 0,
            submissions: Vec::new(),
            validation_bubbles: 0,
            disabled: HashSet::new(),
        };
        let root = state.alloc("html");
        state.root = root;
        Self {
            state: RefCell::new(state),
        }
    }

    /// Withdraws a capability; later calls needing it return `Unsupported`.
    pub fn disable(&self, capability: Capability) {
        self.state.borrow_mut().disabled.insert(capability);
    }

    /// Creates a detached element carrying `attributes`.
    pub fn element(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut state = self.state.borrow_mut();
        let id = state.alloc(tag);
        if let Some(node) = state.nodes.get_mut(&id) {
            for (name, value) in attributes {
                node.attributes.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
        id
    }

    /// Appends `child` to `parent` and notifies observers.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let (callbacks, record) = {
            let mut state = self.state.borrow_mut();
            if !state.nodes.contains_key(&parent) || !state.nodes.contains_key(&child) {
                return;
            }
            let previous = state.detach(child);
            if let Some(node) = state.nodes.get_mut(&child) {
                node.parent = Some(parent);
            }
            if let Some(p) = state.nodes.get_mut(&parent) {
                p.children.push(child);
            }
            if let Some(prev) = previous {
                debug!("Moved node {} from {} to {}", child, prev, parent);
            }
            let record = MutationRecord {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            };
            (state.observers_for(parent), record)
        };
        notify(&callbacks, record);
    }

    /// Convenience: creates an element and appends it to `parent`.
    pub fn append(&self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.element(tag, attributes);
        self.append_child(parent, id);
        id
    }

    /// Detaches `node` (and its subtree) from the document.
    pub fn remove(&self, node: NodeId) {
        let (callbacks, record) = {
            let mut state = self.state.borrow_mut();
            let Some(parent) = state.detach(node) else { return };
            let record = MutationRecord {
                target: parent,
                added: Vec::new(),
                removed: vec![node],
            };
            (state.observers_for(parent), record)
        };
        notify(&callbacks, record);
    }

    /// Detaches `node` and forgets it and its subtree, the way the page's last
    /// reference to an element going away lets it be collected.
    pub fn destroy(&self, node: NodeId) {
        if node == self.root() {
            return;
        }
        self.remove(node);
        let doomed = self.subtree(node);
        let mut state = self.state.borrow_mut();
        for id in doomed {
            state.nodes.remove(&id);
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    /// Number of nodes attached to the document.
    pub fn node_count(&self) -> usize {
        self.subtree(self.root()).len()
    }

    /// Number of listeners of `kind` registered on `node`.
    pub fn listener_count(&self, node: NodeId, kind: EventKind) -> usize {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map_or(0, |n| n.listeners.iter().filter(|l| l.kind == kind).count())
    }

    /// Every native submission performed so far, in order.
    pub fn submissions(&self) -> Vec<NodeId> {
        self.state.borrow().submissions.clone()
    }

    pub fn submission_count(&self, form: NodeId) -> usize {
        self.state
            .borrow()
            .submissions
            .iter()
            .filter(|f| **f == form)
            .count()
    }

    /// How often the validity override was installed on this document.
    pub fn override_installs(&self) -> usize {
        self.state.borrow().override_installs
    }

    /// How many native validation bubbles the page would have shown.
    pub fn validation_bubbles(&self) -> usize {
        self.state.borrow().validation_bubbles
    }

    pub fn custom_validity(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.custom_validity.clone())
            .unwrap_or_default()
    }

    /// Dispatches an event through capture, target and bubble phases.
    pub fn dispatch(&self, target: NodeId, kind: EventKind) -> Event {
        let event = Event::new(kind, target);
        let path = {
            let state = self.state.borrow();
            let mut path = state.ancestors(target);
            path.reverse();
            path
        };

        for node in &path {
            for listener in self.listeners(*node, kind, Some(true)) {
                listener(&event);
            }
        }
        for listener in self.listeners(target, kind, None) {
            listener(&event);
        }
        if kind.bubbles() {
            for node in path.iter().rev() {
                for listener in self.listeners(*node, kind, Some(false)) {
                    listener(&event);
                }
            }
        }
        event
    }

    /// Emulates a user pressing a submit button of `form`.
    ///
    /// Unless the form carries `novalidate`, the browser's own interactive
    /// validation runs first (the page-facing override does not affect it).
    /// Otherwise a submit event is dispatched and, if nobody cancels it, the
    /// native submission is performed as its default action.
    pub fn user_submit(&self, form: NodeId) -> SubmitOutcome {
        let novalidate = self.get_attribute(form, "novalidate").is_some();
        if !novalidate && !self.validate_form(form, true) {
            return SubmitOutcome::BlockedByValidation;
        }
        let event = self.dispatch(form, EventKind::Submit);
        if event.default_prevented() {
            return SubmitOutcome::Prevented;
        }
        self.state.borrow_mut().submissions.push(form);
        SubmitOutcome::Submitted
    }

    /// Emulates focus leaving `field`.
    pub fn blur(&self, field: NodeId) {
        self.dispatch(field, EventKind::Blur);
    }

    /// Page-facing `form.checkValidity()`.
    pub fn check_validity(&self, form: NodeId) -> bool {
        if self.state.borrow().validity_overridden {
            return true;
        }
        self.validate_form(form, false)
    }

    /// Page-facing `form.reportValidity()`.
    pub fn report_validity(&self, form: NodeId) -> bool {
        if self.state.borrow().validity_overridden {
            return true;
        }
        self.validate_form(form, true)
    }

    fn listeners(&self, node: NodeId, kind: EventKind, capture: Option<bool>) -> Vec<EventListener> {
        let state = self.state.borrow();
        let Some(data) = state.nodes.get(&node) else { return Vec::new() };
        match capture {
            Some(phase) => data
                .listeners
                .iter()
                .filter(|l| l.kind == kind && l.capture == phase)
                .map(|l| l.listener.clone())
                .collect(),
            // Target phase: capturing listeners first, then the rest.
            None => data
                .listeners
                .iter()
                .filter(|l| l.kind == kind && l.capture)
                .chain(data.listeners.iter().filter(|l| l.kind == kind && !l.capture))
                .map(|l| l.listener.clone())
                .collect(),
        }
    }

    fn validate_form(&self, form: NodeId, report: bool) -> bool {
        let fields: Vec<NodeId> = self
            .subtree(form)
            .into_iter()
            .filter(|n| {
                self.tag_name(*n)
                    .map_or(false, |t| matches!(t.as_str(), "input" | "select" | "textarea"))
            })
            .collect();

        let mut valid = true;
        for field in fields {
            if self.field_is_valid(field) {
                continue;
            }
            valid = false;
            let event = self.dispatch(field, EventKind::Invalid);
            if report && !event.default_prevented() {
                self.state.borrow_mut().validation_bubbles += 1;
            }
        }
        valid
    }

    fn field_is_valid(&self, field: NodeId) -> bool {
        let state = self.state.borrow();
        let Some(node) = state.nodes.get(&field) else { return true };
        if !node.custom_validity.is_empty() {
            return false;
        }
        let value = node.value.as_str();
        let attr = |name: &str| node.attributes.get(name).map(String::as_str);

        if value.is_empty() {
            return attr("required").is_none();
        }
        if let Some(pattern) = attr("pattern") {
            // Browsers ignore patterns that fail to compile.
            if let Ok(re) = Regex::new(&format!("^(?:{})$", pattern)) {
                if !re.is_match(value) {
                    return false;
                }
            }
        }
        let length = value.chars().count();
        if let Some(min) = attr("minlength").and_then(|v| v.parse::<usize>().ok()) {
            if length < min {
                return false;
            }
        }
        if let Some(max) = attr("maxlength").and_then(|v| v.parse::<usize>().ok()) {
            if length > max {
                return false;
            }
        }
        if let Ok(number) = value.parse::<f64>() {
            if let Some(min) = attr("min").and_then(|v| v.parse::<f64>().ok()) {
                if number < min {
                    return false;
                }
            }
            if let Some(max) = attr("max").and_then(|v| v.parse::<f64>().ok()) {
                if number > max {
                    return false;
                }
            }
        }
        true
    }
}

fn notify(callbacks: &[MutationCallback], record: MutationRecord) {
    let records = [record];
    for callback in callbacks {
        callback(&records);
    }
}

impl Document for MemoryDocument {
    fn root(&self) -> NodeId {
        self.state.borrow().root
    }

    fn host_name(&self) -> String {
        self.state.borrow().host.clone()
    }

    fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let state = self.state.borrow();
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = state.nodes.get(&id) else { continue };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn contains(&self, node: NodeId) -> bool {
        self.state.borrow().is_connected(node)
    }

    fn exists(&self, node: NodeId) -> bool {
        self.state.borrow().nodes.contains_key(&node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.state.borrow().nodes.get(&node).map(|n| n.tag.clone())
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.attributes.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.attributes.remove(name);
        }
    }

    fn value(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.value.clone())
            .unwrap_or_default()
    }

    fn set_value(&self, node: NodeId, value: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.value = value.to_string();
        }
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.state.borrow_mut().alloc(tag)
    }

    fn set_text_content(&self, node: NodeId, text: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.text = text.to_string();
        }
    }

    fn insert_after(&self, reference: NodeId, node: NodeId) -> HostResult<()> {
        let (callbacks, record) = {
            let mut state = self.state.borrow_mut();
            let parent = state
                .nodes
                .get(&reference)
                .and_then(|n| n.parent)
                .ok_or(FormTamerError::Detached(reference))?;
            if !state.nodes.contains_key(&node) {
                return Err(FormTamerError::Detached(node));
            }
            state.detach(node);
            if let Some(n) = state.nodes.get_mut(&node) {
                n.parent = Some(parent);
            }
            if let Some(p) = state.nodes.get_mut(&parent) {
                let at = p
                    .children
                    .iter()
                    .position(|c| *c == reference)
                    .map_or(p.children.len(), |i| i + 1);
                p.children.insert(at, node);
            }
            let record = MutationRecord {
                target: parent,
                added: vec![node],
                removed: Vec::new(),
            };
            (state.observers_for(parent), record)
        };
        notify(&callbacks, record);
        Ok(())
    }

    fn add_event_listener(
        &self,
        node: NodeId,
        kind: EventKind,
        capture: bool,
        listener: EventListener,
    ) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.listeners.push(RegisteredListener {
                kind,
                capture,
                listener,
            });
        }
    }

    fn set_custom_validity(&self, node: NodeId, message: &str) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.require(Capability::CustomValidity)?;
        let overridden = state.validity_overridden;
        let Some(n) = state.nodes.get_mut(&node) else { return Ok(()) };
        if overridden && matches!(n.tag.as_str(), "input" | "textarea") {
            return Ok(());
        }
        n.custom_validity = message.to_string();
        Ok(())
    }

    fn install_validity_override(&self) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.require(Capability::ValidityOverride)?;
        state.validity_overridden = true;
        state.override_installs += 1;
        Ok(())
    }

    fn native_submit(&self, form: NodeId) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.require(Capability::NativeSubmit)?;
        if !state.nodes.contains_key(&form) {
            return Err(FormTamerError::Detached(form));
        }
        state.submissions.push(form);
        Ok(())
    }

    fn observe_mutations(&self, root: NodeId, callback: MutationCallback) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.require(Capability::MutationObserver)?;
        state.observers.push((root, callback));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_capture_listeners_run_before_bubble() {
        let doc = MemoryDocument::new("example.nl");
        let body = doc.append(doc.root(), "body", &[]);
        let form = doc.append(body, "form", &[]);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        doc.add_event_listener(body, EventKind::Submit, false, Rc::new(move |_: &Event| o.borrow_mut().push("bubble")));
        let o = order.clone();
        doc.add_event_listener(form, EventKind::Submit, false, Rc::new(move |_: &Event| o.borrow_mut().push("target")));
        let o = order.clone();
        doc.add_event_listener(body, EventKind::Submit, true, Rc::new(move |_: &Event| o.borrow_mut().push("capture")));

        doc.dispatch(form, EventKind::Submit);
        assert_eq!(*order.borrow(), vec!["capture", "target", "bubble"]);
    }

    #[test]
    fn test_required_field_blocks_submit_until_novalidate() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        doc.append(form, "input", &[("required", "")]);

        assert_eq!(doc.user_submit(form), SubmitOutcome::BlockedByValidation);
        assert_eq!(doc.validation_bubbles(), 1);

        doc.set_attribute(form, "novalidate", "novalidate");
        assert_eq!(doc.user_submit(form), SubmitOutcome::Submitted);
        assert_eq!(doc.submission_count(form), 1);
    }

    #[test]
    fn test_pattern_literal_with_slashes_is_enforced_literally() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let field = doc.append(form, "input", &[("pattern", "/[0-9]{4}/")]);
        doc.set_value(field, "1234");
        assert!(!doc.check_validity(form));

        doc.set_attribute(field, "pattern", "[0-9]{4}");
        assert!(doc.check_validity(form));
    }

    #[test]
    fn test_validity_override_and_custom_validity() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let field = doc.append(form, "input", &[]);
        doc.set_custom_validity(field, "nope").unwrap();
        assert!(!doc.check_validity(form));

        doc.install_validity_override().unwrap();
        assert!(doc.check_validity(form));
        assert!(doc.report_validity(form));
        doc.set_custom_validity(field, "ignored").unwrap();
        assert_eq!(doc.custom_validity(field), "nope");
    }

    #[test]
    fn test_mutations_are_reported_and_removal_detaches() {
        let doc = MemoryDocument::new("example.nl");
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        doc.observe_mutations(doc.root(), Rc::new(move |records: &[MutationRecord]| s.set(s.get() + records.len())))
            .unwrap();

        let div = doc.append(doc.root(), "div", &[]);
        let input = doc.append(div, "input", &[]);
        assert_eq!(seen.get(), 2);
        assert!(doc.contains(input));

        doc.remove(div);
        assert_eq!(seen.get(), 3);
        assert!(!doc.contains(input));
        assert!(doc.exists(input));

        doc.append_child(doc.root(), div);
        assert!(doc.contains(input));
        doc.destroy(div);
        assert_eq!(seen.get(), 5);
        assert!(!doc.exists(div));
        assert!(!doc.exists(input));
        assert!(doc.tag_name(input).is_none());
    }

    #[test]
    fn test_disabled_capability_reports_unsupported() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        doc.disable(Capability::NativeSubmit);
        assert!(matches!(doc.native_submit(form), Err(FormTamerError::Unsupported(_))));
        assert!(doc.submissions().is_empty());
    }
}
