//! Postcode hints: annotate postal-code fields with the local format and
//! normalize what the user typed when the field loses focus.
//!
//! License: MIT OR APACHE 2.0

use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::engine::{ScanContext, Stage, StageReport};
use crate::errors::FormTamerError;
use crate::host::{select, Document, Event, EventKind, EventListener, NodeId};
use crate::markers::Marker;
use crate::policy::Feature;
use crate::rules::{CompiledPostcodeRule, PostcodeRuleEngine};

/// Class of the inserted hint element.
pub const HINT_CLASS: &str = "ft-postcode-hint";

/// How long a freshly detected field stays highlighted.
pub const HIGHLIGHT_DURATION: Duration = Duration::from_millis(1500);

/// Declarations appended to the field's inline style while highlighted.
pub const HIGHLIGHT_STYLE: &str = "outline: 2px solid #f5a623; outline-offset: 1px;";

const HINT_TEMPLATE: &str = "{country}: e.g. {example}";

/// Renders the hint text for a country, e.g. `Netherlands: e.g. 1234 AB`.
pub fn format_hint(country: &str, example: &str) -> Result<String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template("hint", HINT_TEMPLATE)
        .context("Failed to parse hint template")?;
    let ctx = serde_json::json!({ "country": country, "example": example });
    tt.render("hint", &ctx)
        .map_err(|e| anyhow!("Failed to render hint template: {}", e))
}

#[derive(Debug)]
pub struct PostcodeHints {
    engine: PostcodeRuleEngine,
}

impl PostcodeHints {
    pub fn new() -> Result<Self, FormTamerError> {
        Ok(Self {
            engine: PostcodeRuleEngine::new()?,
        })
    }

    pub fn engine(&self) -> &PostcodeRuleEngine {
        &self.engine
    }

    /// Decorates every undecorated postcode field under `ctx.root`.
    pub fn decorate_fields(&self, ctx: &ScanContext<'_>) -> usize {
        let Some(country) = ctx.snapshot.country.as_deref() else {
            return 0;
        };
        let Some(rule) = self.engine.rule(country) else {
            debug!("No postcode rule for '{}'; skipping hints.", country);
            return 0;
        };

        let doc = ctx.doc.as_ref();
        let mut decorated = 0;
        for field in select(doc, ctx.root, &["input"]) {
            if ctx.markers.is_bound(Marker::PostcodeHint, field) {
                continue;
            }
            if !self.engine.is_postcode_field(doc, field) {
                continue;
            }
            ctx.markers.bind(Marker::PostcodeHint, field);
            self.decorate(ctx, field, &rule);
            decorated += 1;
        }
        decorated
    }

    fn decorate(&self, ctx: &ScanContext<'_>, field: NodeId, rule: &Arc<CompiledPostcodeRule>) {
        let doc = ctx.doc.as_ref();
        match format_hint(rule.rule.display_name, rule.rule.example) {
            Ok(text) => {
                let hint = doc.create_element("span");
                doc.set_attribute(hint, "class", HINT_CLASS);
                doc.set_text_content(hint, &text);
                if let Err(e) = doc.insert_after(field, hint) {
                    debug!("Could not insert postcode hint after {}: {}", field, e);
                }
            }
            Err(e) => debug!("Skipping hint for {}: {:#}", field, e),
        }

        highlight(ctx, field);

        doc.add_event_listener(
            field,
            EventKind::Blur,
            false,
            normalize_on_blur(Rc::downgrade(ctx.doc), rule.clone()),
        );
    }
}

fn highlight(ctx: &ScanContext<'_>, field: NodeId) {
    let doc = ctx.doc.as_ref();
    let previous = doc.get_attribute(field, "style");
    let highlighted = match previous.as_deref().map(str::trim) {
        Some(style) if !style.is_empty() => {
            format!("{}; {}", style.trim_end_matches(';'), HIGHLIGHT_STYLE)
        }
        _ => HIGHLIGHT_STYLE.to_string(),
    };
    doc.set_attribute(field, "style", &highlighted);

    let weak = Rc::downgrade(ctx.doc);
    ctx.event_loop.set_timeout(
        HIGHLIGHT_DURATION,
        Box::new(move || {
            let Some(doc) = weak.upgrade() else { return };
            // The page restyled the field meanwhile; keep its style.
            if doc.get_attribute(field, "style").as_deref() != Some(highlighted.as_str()) {
                return;
            }
            match &previous {
                Some(style) => doc.set_attribute(field, "style", style),
                None => doc.remove_attribute(field, "style"),
            }
        }),
    );
}

fn normalize_on_blur(doc: Weak<dyn Document>, rule: Arc<CompiledPostcodeRule>) -> EventListener {
    Rc::new(move |event: &Event| {
        let Some(doc) = doc.upgrade() else { return };
        let field = event.target();
        let raw = doc.value(field);
        if raw.is_empty() {
            return;
        }
        let normalized = rule.normalize(&raw);
        if normalized != raw {
            debug!("Normalized {} postcode {:?} -> {:?}", rule.rule.key, raw, normalized);
            doc.set_value(field, &normalized);
        }
        if !rule.recognizes(&normalized) {
            debug!("{:?} does not look like a {} postcode.", normalized, rule.rule.display_name);
        }
    })
}

impl Stage for PostcodeHints {
    fn name(&self) -> &'static str {
        "postcode_hints"
    }

    fn feature(&self) -> Feature {
        Feature::PostcodeHints
    }

    fn apply(&self, ctx: &ScanContext<'_>) -> StageReport {
        StageReport {
            stage: self.name(),
            touched: self.decorate_fields(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EventLoop, MemoryDocument, TokioEventLoop};
    use crate::markers::BoundFieldMarkers;
    use crate::policy::{Policy, PolicySnapshot};

    #[test]
    fn test_hint_text() {
        assert_eq!(format_hint("Netherlands", "1234 AB").unwrap(), "Netherlands: e.g. 1234 AB");
        assert_eq!(format_hint("Côte <x>", "A&B").unwrap(), "Côte <x>: e.g. A&B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decorates_once_and_restores_style() {
        let tokio_loop = TokioEventLoop::new();
        let memory = Rc::new(MemoryDocument::new("www.winkel.nl"));
        let doc: Rc<dyn Document> = memory.clone();
        let event_loop: Rc<dyn EventLoop> = Rc::new(tokio_loop.clone());
        let markers = BoundFieldMarkers::new();
        let snapshot = PolicySnapshot::capture(Policy::default(), &doc.host_name());
        let form = memory.append(memory.root(), "form", &[]);
        let zip = memory.append(form, "input", &[("name", "postcode"), ("style", "color: red;")]);
        let city = memory.append(form, "input", &[("name", "city")]);

        let stage = PostcodeHints::new().unwrap();
        let ctx = ScanContext {
            doc: &doc,
            event_loop: &event_loop,
            markers: &markers,
            snapshot: &snapshot,
            root: doc.root(),
        };
        assert_eq!(stage.decorate_fields(&ctx), 1);
        assert_eq!(stage.decorate_fields(&ctx), 0);

        let children = memory.children(form);
        assert_eq!(children.len(), 3);
        let hint = children[1];
        assert_eq!(memory.get_attribute(hint, "class").as_deref(), Some(HINT_CLASS));
        assert_eq!(memory.text_content(hint), "Netherlands: e.g. 1234 AB");
        assert_eq!(children[2], city);

        let style = memory.get_attribute(zip, "style").unwrap();
        assert!(style.starts_with("color: red; outline"));

        let m = memory.clone();
        tokio_loop
            .run_until(async move {
                tokio::time::sleep(HIGHLIGHT_DURATION + Duration::from_millis(1)).await;
                assert_eq!(m.get_attribute(zip, "style").as_deref(), Some("color: red;"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_restyle_during_highlight_is_kept() {
        let tokio_loop = TokioEventLoop::new();
        let memory = Rc::new(MemoryDocument::new("www.winkel.nl"));
        let doc: Rc<dyn Document> = memory.clone();
        let event_loop: Rc<dyn EventLoop> = Rc::new(tokio_loop.clone());
        let markers = BoundFieldMarkers::new();
        let snapshot = PolicySnapshot::capture(Policy::default(), &doc.host_name());
        let form = memory.append(memory.root(), "form", &[]);
        let zip = memory.append(form, "input", &[("name", "postcode")]);
        let plain = memory.append(form, "input", &[("name", "zipcode")]);

        let stage = PostcodeHints::new().unwrap();
        let ctx = ScanContext {
            doc: &doc,
            event_loop: &event_loop,
            markers: &markers,
            snapshot: &snapshot,
            root: doc.root(),
        };
        assert_eq!(stage.decorate_fields(&ctx), 2);
        assert_eq!(memory.get_attribute(zip, "style").as_deref(), Some(HIGHLIGHT_STYLE));
        memory.set_attribute(zip, "style", "display: none");

        let m = memory.clone();
        tokio_loop
            .run_until(async move {
                tokio::time::sleep(HIGHLIGHT_DURATION + Duration::from_millis(1)).await;
                assert_eq!(m.get_attribute(zip, "style").as_deref(), Some("display: none"));
                assert!(m.get_attribute(plain, "style").is_none());
            })
            .await;
    }

    #[test]
    fn test_blur_normalizes_only_on_change() {
        let memory = Rc::new(MemoryDocument::new("example.nl"));
        let doc: Rc<dyn Document> = memory.clone();
        let field = memory.append(memory.root(), "input", &[("name", "zip")]);
        let engine = PostcodeRuleEngine::new().unwrap();
        let listener = normalize_on_blur(Rc::downgrade(&doc), engine.rule("nl").unwrap());
        doc.add_event_listener(field, EventKind::Blur, false, listener);

        memory.set_value(field, "1234ab");
        memory.blur(field);
        assert_eq!(memory.value(field), "1234 AB");

        memory.set_value(field, "not a postcode");
        memory.blur(field);
        assert_eq!(memory.value(field), "not a postcode");
    }

    #[test]
    fn test_unknown_country_gets_no_hints() {
        let memory = Rc::new(MemoryDocument::new("localhost"));
        let doc: Rc<dyn Document> = memory.clone();
        let event_loop: Rc<dyn EventLoop> = Rc::new(TokioEventLoop::new());
        let markers = BoundFieldMarkers::new();
        let snapshot = PolicySnapshot::capture(Policy::default(), "localhost");
        memory.append(memory.root(), "input", &[("name", "zip")]);
        let before = memory.node_count();

        let ctx = ScanContext { doc: &doc, event_loop: &event_loop, markers: &markers, snapshot: &snapshot, root: doc.root() };
        assert_eq!(PostcodeHints::new().unwrap().decorate_fields(&ctx), 0);
        assert_eq!(memory.node_count(), before);
    }
}
