//! Turns off native constraint validation on forms and fields.

use std::rc::Rc;

use log::debug;

use crate::engine::{ScanContext, Stage, StageReport};
use crate::host::{is_field, select, Document, Event, EventKind, EventListener, NodeId};
use crate::markers::{BoundFieldMarkers, Marker};
use crate::policy::Feature;

/// Attributes that drive built-in validation.
pub const CONSTRAINT_ATTRIBUTES: [&str; 7] =
    ["required", "pattern", "min", "max", "maxlength", "minlength", "step"];

/// Sets `novalidate` on `form` unless already present. Returns whether it changed.
pub(crate) fn mark_novalidate(doc: &dyn Document, form: NodeId) -> bool {
    if doc.get_attribute(form, "novalidate").is_some() {
        return false;
    }
    doc.set_attribute(form, "novalidate", "novalidate");
    true
}

/// Suppresses validation for every form and field under `root`.
/// Returns the number of elements changed.
pub fn suppress_validation(doc: &dyn Document, markers: &BoundFieldMarkers, root: NodeId) -> usize {
    let mut touched = 0;

    for form in select(doc, root, &["form"]) {
        if mark_novalidate(doc, form) {
            touched += 1;
        }
    }

    for field in doc.subtree(root).into_iter().filter(|n| is_field(doc, *n)) {
        let mut changed = false;
        for attr in CONSTRAINT_ATTRIBUTES {
            if doc.get_attribute(field, attr).is_some() {
                doc.remove_attribute(field, attr);
                changed = true;
            }
        }

        if let Err(e) = doc.set_custom_validity(field, "") {
            debug!("Could not clear custom validity on {}: {}", field, e);
        }

        if markers.bind(Marker::InvalidGuard, field) {
            let cancel: EventListener = Rc::new(|event: &Event| event.prevent_default());
            doc.add_event_listener(field, EventKind::Invalid, true, cancel);
            changed = true;
        }

        if changed {
            touched += 1;
        }
    }
    touched
}

#[derive(Debug, Default)]
pub struct ValidationSuppressor;

impl Stage for ValidationSuppressor {
    fn name(&self) -> &'static str {
        "validation_suppressor"
    }

    fn feature(&self) -> Feature {
        Feature::SuppressValidation
    }

    fn apply(&self, ctx: &ScanContext<'_>) -> StageReport {
        StageReport {
            stage: self.name(),
            touched: suppress_validation(ctx.doc.as_ref(), ctx.markers, ctx.root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Capability, MemoryDocument, SubmitOutcome};

    #[test]
    fn test_strips_constraints_and_sets_novalidate() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let input = doc.append(form, "input", &[("required", ""), ("maxlength", "3"), ("name", "q")]);
        let select_el = doc.append(form, "select", &[("required", "")]);
        let markers = BoundFieldMarkers::new();

        assert_eq!(suppress_validation(&doc, &markers, doc.root()), 3);
        assert_eq!(doc.get_attribute(form, "novalidate").as_deref(), Some("novalidate"));
        for attr in CONSTRAINT_ATTRIBUTES {
            assert!(doc.get_attribute(input, attr).is_none());
            assert!(doc.get_attribute(select_el, attr).is_none());
        }
        assert_eq!(doc.get_attribute(input, "name").as_deref(), Some("q"));
        assert_eq!(doc.user_submit(form), SubmitOutcome::Submitted);
    }

    #[test]
    fn test_invalid_listener_is_attached_once() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let input = doc.append(form, "input", &[]);
        let markers = BoundFieldMarkers::new();

        suppress_validation(&doc, &markers, doc.root());
        assert_eq!(suppress_validation(&doc, &markers, doc.root()), 0);
        assert_eq!(doc.listener_count(input, EventKind::Invalid), 1);
    }

    #[test]
    fn test_invalid_events_are_cancelled() {
        let doc = MemoryDocument::new("example.nl");
        let form = doc.append(doc.root(), "form", &[]);
        let input = doc.append(form, "input", &[]);
        doc.set_custom_validity(input, "custom error").unwrap();
        let markers = BoundFieldMarkers::new();

        suppress_validation(&doc, &markers, doc.root());
        assert_eq!(doc.custom_validity(input), "");
        assert!(doc.dispatch(input, EventKind::Invalid).default_prevented());
    }

    #[test]
    fn test_missing_custom_validity_is_tolerated() {
        let doc = MemoryDocument::new("example.nl");
        doc.disable(Capability::CustomValidity);
        let form = doc.append(doc.root(), "form", &[]);
        doc.append(form, "input", &[("required", "")]);
        let markers = BoundFieldMarkers::new();

        assert_eq!(suppress_validation(&doc, &markers, doc.root()), 2);
    }
}
