//! Defines the `Stage` trait and the pipeline that runs stages in order.
//!
//! Every behavior of the engine is a pluggable stage gated by one policy
//! switch. The pipeline applies them in a fixed order so validation is always
//! suppressed before a bypass submission could fire.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::host::{Document, EventLoop, NodeId};
use crate::markers::BoundFieldMarkers;
use crate::policy::{Feature, PolicySnapshot};

/// Everything a stage needs for one pass over a subtree.
pub struct ScanContext<'a> {
    pub doc: &'a Rc<dyn Document>,
    pub event_loop: &'a Rc<dyn EventLoop>,
    pub markers: &'a BoundFieldMarkers,
    pub snapshot: &'a PolicySnapshot,
    pub root: NodeId,
}

/// How many elements a stage changed during one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub touched: usize,
}

/// A pluggable rewrite applied to every scan.
pub trait Stage {
    /// Stable name used in reports and logs.
    fn name(&self) -> &'static str;

    /// The policy switch gating this stage.
    fn feature(&self) -> Feature;

    /// Applies the stage to `ctx.root`. Must be idempotent and must not fail.
    fn apply(&self, ctx: &ScanContext<'_>) -> StageReport;
}

/// Result of one application cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub reports: Vec<StageReport>,
}

impl ScanSummary {
    pub fn touched(&self, stage: &str) -> usize {
        self.reports
            .iter()
            .find(|r| r.stage == stage)
            .map_or(0, |r| r.touched)
    }

    pub fn total_touched(&self) -> usize {
        self.reports.iter().map(|r| r.touched).sum()
    }

    /// Whether any stage ran at all.
    pub fn ran(&self) -> bool {
        !self.reports.is_empty()
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return write!(f, "no stages ran");
        }
        let parts: Vec<String> = self
            .reports
            .iter()
            .map(|r| format!("{}={}", r.stage, r.touched))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Rc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Rc<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every enabled stage in order. Does nothing when the master switch is off.
    pub fn run(&self, ctx: &ScanContext<'_>) -> ScanSummary {
        let policy = &ctx.snapshot.policy;
        if !policy.enabled {
            debug!("Policy disabled; skipping scan of {}.", ctx.root);
            return ScanSummary::default();
        }
        let reports = self
            .stages
            .iter()
            .filter(|stage| policy.allows(stage.feature()))
            .map(|stage| stage.apply(ctx))
            .collect();
        ScanSummary { reports }
    }
}
