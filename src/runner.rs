//! Concurrent execution of a batch of healthchecks against one container.
//!
//! Every probe gets its own task. The runner waits for all of them before
//! reporting, so a slow probe is never dropped because a fast one failed
//! first. Failed probes then fire their on-failure triggers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::appjson::{HealthcheckEntry, OnFailure};
use crate::healthcheck::on_failure::{self, TriggerError};
use crate::healthcheck::probe::{self, ProbeContext, ProbeError, ProbeReport, ProbeResult};
use crate::healthcheck::{Healthcheck, ProbeDefaults, derive_name};
use crate::runtime::{ContainerRuntime, ContainerState};

/// What to do when no healthcheck matched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EmptyBatch {
    /// Report success with no results.
    #[default]
    Pass,
    /// Run this entry instead.
    Substitute(HealthcheckEntry),
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One result per probe, in batch order.
    pub results: Vec<ProbeResult>,
    /// On-failure triggers that themselves failed, by healthcheck name.
    pub trigger_errors: Vec<(String, TriggerError)>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|result| !result.passed())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            results: self.results.iter().map(ProbeResult::report).collect(),
            trigger_errors: self
                .trigger_errors
                .iter()
                .map(|(name, e)| TriggerReport {
                    name: name.clone(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Serialisable view of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub results: Vec<ProbeReport>,
    pub trigger_errors: Vec<TriggerReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    pub name: String,
    pub error: String,
}

pub struct Runner {
    runtime: Arc<dyn ContainerRuntime>,
    defaults: ProbeDefaults,
    context: ProbeContext,
    empty_batch: EmptyBatch,
}

impl Runner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            defaults: ProbeDefaults::default(),
            context: ProbeContext::default(),
            empty_batch: EmptyBatch::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: ProbeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_context(mut self, context: ProbeContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_empty_batch(mut self, empty_batch: EmptyBatch) -> Self {
        self.empty_batch = empty_batch;
        self
    }

    pub async fn run(&self, container: &ContainerState, entries: &[HealthcheckEntry]) -> BatchReport {
        let substitute;
        let entries = match (&self.empty_batch, entries.is_empty()) {
            (EmptyBatch::Pass, true) => {
                log::info!("No healthchecks to run for container {}", container.id);
                return BatchReport::default();
            }
            (EmptyBatch::Substitute(entry), true) => {
                log::info!("No healthchecks found, running the default check");
                substitute = [entry.clone()];
                &substitute[..]
            }
            (_, false) => entries,
        };

        let container = Arc::new(container.clone());
        let mut slots: Vec<Option<ProbeResult>> = entries.iter().map(|_| None).collect();
        let mut tasks = HashMap::new();
        let mut join_set = JoinSet::new();

        for (index, entry) in entries.iter().enumerate() {
            let check = match Healthcheck::from_entry(entry, &self.defaults) {
                Ok(check) => check,
                Err(e) => {
                    log::error!("Invalid healthcheck: {}", e);
                    let outcome = ProbeError::from(e).into();
                    slots[index] = Some(ProbeResult::new(derive_name(entry), entry.warn, outcome));
                    continue;
                }
            };

            let identity = (index, check.name.clone(), check.warn_only);
            let runtime = Arc::clone(&self.runtime);
            let container = Arc::clone(&container);
            let context = self.context.clone();
            let handle = join_set.spawn(async move {
                (index, run_probe(check, &container, runtime.as_ref(), &context).await)
            });
            tasks.insert(handle.id(), identity);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (index, result))) => slots[index] = Some(result),
                Err(e) => {
                    let Some((index, name, warn_only)) = tasks.remove(&e.id()) else {
                        log::error!("Healthcheck task failed: {}", e);
                        continue;
                    };
                    log::error!("Healthcheck name='{}' task failed: {}", name, e);
                    let outcome = ProbeError::Panicked(e.to_string()).into();
                    slots[index] = Some(ProbeResult::new(name, warn_only, outcome));
                }
            }
        }

        let results: Vec<ProbeResult> = slots.into_iter().flatten().collect();
        let trigger_errors = fire_triggers(entries, &results).await;
        BatchReport {
            results,
            trigger_errors,
        }
    }
}

async fn run_probe(
    check: Healthcheck,
    container: &ContainerState,
    runtime: &dyn ContainerRuntime,
    context: &ProbeContext,
) -> ProbeResult {
    let uptime = container.uptime_at(Utc::now()).unwrap_or(Duration::ZERO);
    let delay = check.initial_delay.saturating_sub(uptime);

    log::info!(
        "Running healthcheck name='{}' type={} attempts={} delay={} wait={}",
        check.name,
        check.kind.label(),
        check.attempts,
        delay.as_secs(),
        check.wait.as_secs()
    );
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let outcome = probe::execute(&check, container, runtime, context).await;
    let result = ProbeResult::new(check.name, check.warn_only, outcome);
    log_result(&result);
    result
}

fn log_result(result: &ProbeResult) {
    let Some(last) = result.errors.last() else {
        log::info!("Healthcheck succeeded name='{}'", result.name);
        return;
    };

    let output = String::from_utf8_lossy(&result.output);
    let output = output.trim();
    if result.warn_only {
        log::warn!("Failure in name='{}' (warn only): {}", result.name, last);
    } else {
        log::error!("Failure in name='{}': {}", result.name, last);
    }
    if !output.is_empty() {
        log::error!("Error for healthcheck name='{}', output: {}", result.name, output);
    }
}

async fn fire_triggers(
    entries: &[HealthcheckEntry],
    results: &[ProbeResult],
) -> Vec<(String, TriggerError)> {
    let triggers = entries
        .iter()
        .zip(results)
        .filter(|(_, result)| !result.passed())
        .filter_map(|(entry, result)| entry.on_failure.as_ref().map(|hook| (hook, result)))
        .map(|(hook, result): (&OnFailure, &ProbeResult)| async move {
            let errors = result.error_messages();
            let failures = on_failure::trigger(hook, &result.name, &errors).await;
            failures
                .into_iter()
                .map(|e| {
                    log::warn!("On failure trigger for name='{}' failed: {}", result.name, e);
                    (result.name.clone(), e)
                })
                .collect::<Vec<_>>()
        });

    future::join_all(triggers).await.into_iter().flatten().collect()
}
