//! The `FormTamer` debug console.
//!
//! A small manual-control surface for interactive debugging: read the policy,
//! set individual switches through the store, and force passes that ignore
//! the policy. Toggles go through [`PolicyStore::write`], so the orchestrator
//! picks them up through its normal change subscription.

use std::rc::{Rc, Weak};

use anyhow::{anyhow, Result};
use log::info;

use crate::orchestrator::Orchestrator;
use crate::policy::{Feature, Policy, PolicyPatch};
use crate::store::PolicyStore;

/// Name the console is published under.
pub const CONSOLE_NAME: &str = "FormTamer";

#[derive(Clone)]
pub struct DebugConsole {
    orchestrator: Weak<Orchestrator>,
    store: Rc<dyn PolicyStore>,
}

impl std::fmt::Debug for DebugConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugConsole")
            .field("name", &CONSOLE_NAME)
            .field("attached", &(self.orchestrator.strong_count() > 0))
            .finish()
    }
}

impl DebugConsole {
    pub(crate) fn new(orchestrator: Weak<Orchestrator>, store: Rc<dyn PolicyStore>) -> Self {
        Self { orchestrator, store }
    }

    pub fn name(&self) -> &'static str {
        CONSOLE_NAME
    }

    /// The stored policy.
    pub async fn state(&self) -> Result<Policy> {
        self.store.read().await
    }

    /// Sets the master switch to `value`.
    pub async fn toggle_enabled(&self, value: bool) -> Result<Policy> {
        self.write(PolicyPatch::enabled(value)).await
    }

    pub async fn toggle_normalize_patterns(&self, value: bool) -> Result<Policy> {
        self.write(PolicyPatch::feature(Feature::NormalizePatterns, value)).await
    }

    pub async fn toggle_suppress_validation(&self, value: bool) -> Result<Policy> {
        self.write(PolicyPatch::feature(Feature::SuppressValidation, value)).await
    }

    pub async fn toggle_override_submit(&self, value: bool) -> Result<Policy> {
        self.write(PolicyPatch::feature(Feature::OverrideSubmit, value)).await
    }

    pub async fn toggle_postcode_hints(&self, value: bool) -> Result<Policy> {
        self.write(PolicyPatch::feature(Feature::PostcodeHints, value)).await
    }

    async fn write(&self, patch: PolicyPatch) -> Result<Policy> {
        let policy = self.store.write(patch).await?;
        info!("{}: policy is now {:?}", CONSOLE_NAME, policy);
        Ok(policy)
    }

    /// Rewrites pattern attributes now, whatever the policy says.
    pub fn run_fix_now(&self) -> Result<usize> {
        Ok(self.orchestrator()?.normalize_patterns_now())
    }

    /// Suppresses validation now, whatever the policy says.
    pub fn run_kill_now(&self) -> Result<usize> {
        Ok(self.orchestrator()?.suppress_validation_now())
    }

    /// Rewrites the record unchanged, which makes every subscriber re-apply.
    pub async fn apply_now(&self) -> Result<Policy> {
        self.write(PolicyPatch::default()).await
    }

    fn orchestrator(&self) -> Result<Rc<Orchestrator>> {
        self.orchestrator
            .upgrade()
            .ok_or_else(|| anyhow!("{} console outlived its engine", CONSOLE_NAME))
    }
}
