//! Idempotency markers.
//!
//! Instead of tagging elements with attributes, the engine keeps an
//! identity-keyed set per marker kind. Node ids are never reused by a host, and
//! [`BoundFieldMarkers::prune`] only drops ids of nodes the host has destroyed,
//! so a marker lives exactly as long as its element. A detached element keeps
//! its markers and is not decorated again when it is re-inserted.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::host::{Document, NodeId};

/// What has been bound to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The submit-bypass listener is attached to this form.
    SubmitBypass,
    /// The invalid-event cancellation listener is attached to this field.
    InvalidGuard,
    /// This field carries a postcode hint and a blur normalizer.
    PostcodeHint,
}

#[derive(Debug, Default)]
pub struct BoundFieldMarkers {
    bound: RefCell<HashMap<Marker, HashSet<NodeId>>>,
}

impl BoundFieldMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, marker: Marker, node: NodeId) -> bool {
        self.bound
            .borrow()
            .get(&marker)
            .map_or(false, |set| set.contains(&node))
    }

    /// Records `marker` on `node`. Returns false if it was already there.
    pub fn bind(&self, marker: Marker, node: NodeId) -> bool {
        self.bound
            .borrow_mut()
            .entry(marker)
            .or_default()
            .insert(node)
    }

    pub fn count(&self, marker: Marker) -> usize {
        self.bound.borrow().get(&marker).map_or(0, HashSet::len)
    }

    /// Forgets every node that `doc` has destroyed.
    pub fn prune(&self, doc: &dyn Document) -> usize {
        let mut removed = 0;
        for set in self.bound.borrow_mut().values_mut() {
            let before = set.len();
            set.retain(|node| doc.exists(*node));
            removed += before - set.len();
        }
        if removed > 0 {
            debug!("Pruned {} marker(s) of detached nodes.", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;

    #[test]
    fn test_bind_is_idempotent_per_marker() {
        let markers = BoundFieldMarkers::new();
        let node = NodeId(7);
        assert!(markers.bind(Marker::PostcodeHint, node));
        assert!(!markers.bind(Marker::PostcodeHint, node));
        assert!(markers.bind(Marker::InvalidGuard, node));
        assert!(markers.is_bound(Marker::PostcodeHint, node));
        assert!(!markers.is_bound(Marker::SubmitBypass, node));
    }

    #[test]
    fn test_prune_follows_element_lifetime() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let input = doc.append(form, "input", &[]);
        let markers = BoundFieldMarkers::new();
        markers.bind(Marker::SubmitBypass, form);
        markers.bind(Marker::InvalidGuard, input);

        assert_eq!(markers.prune(&doc), 0);
        doc.remove(form);
        assert_eq!(markers.prune(&doc), 0);
        assert!(markers.is_bound(Marker::SubmitBypass, form));
        doc.destroy(form);
        assert_eq!(markers.prune(&doc), 2);
        assert_eq!(markers.count(Marker::SubmitBypass), 0);
    }
}
