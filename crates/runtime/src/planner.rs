//! Trip planning on top of the discovered model
//!
//! The planner owns the discovery result for the life of the process. It is
//! written by startup discovery and by explicit retries, and read by every
//! plan request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::generation::{Generation, GenerativeModel, SearchTool};
use crate::resolver::{Attempt, ResolutionOutcome, Resolver, ServiceBackend};
use crate::types::{GenerationError, ModelId, Region};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an expert Live Travel Planner.
MANDATORY: Use Google Search to verify all prices and hours.
Output format: Structured itinerary with BOLD prices.";

pub const DEFAULT_DESTINATION: &str = "Luanda, Angola";
pub const DEFAULT_WHEN: &str = "Next April";
pub const DEFAULT_PREFERENCES: &str = "Food, History";

/// What the traveller asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripRequest {
    pub destination: String,
    pub when: String,
    pub preferences: String,
}

impl Default for TripRequest {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            when: DEFAULT_WHEN.to_string(),
            preferences: DEFAULT_PREFERENCES.to_string(),
        }
    }
}

impl TripRequest {
    /// Prompt sent to the model. Blank fields fall back to their defaults.
    pub fn prompt(&self) -> String {
        format!(
            "Plan a trip to {} for {}. User likes: {}.",
            or_default(&self.destination, DEFAULT_DESTINATION),
            or_default(&self.when, DEFAULT_WHEN),
            or_default(&self.preferences, DEFAULT_PREFERENCES),
        )
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        default
    } else {
        value
    }
}

/// One failed discovery candidate, flattened for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptSummary {
    pub region: Region,
    pub model: Option<ModelId>,
    pub reason: String,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            region: attempt.region.clone(),
            model: attempt.model.clone(),
            reason: attempt.failure.to_string(),
        }
    }
}

/// Discovery state as shown to users and health checks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingStatus {
    /// Discovery has not run yet
    Pending,
    Bound {
        region: Region,
        model: ModelId,
        search_tool: SearchTool,
        /// The first region and first model were usable
        primary: bool,
        failed_attempts: usize,
    },
    Unresolved {
        attempts: Vec<AttemptSummary>,
    },
}

impl BindingStatus {
    fn from_outcome<H: GenerativeModel>(outcome: Option<&ResolutionOutcome<H>>) -> Self {
        match outcome {
            None => BindingStatus::Pending,
            Some(ResolutionOutcome::Bound(binding)) => BindingStatus::Bound {
                region: binding.region.clone(),
                model: binding.model.clone(),
                search_tool: binding.handle.search_tool(),
                primary: binding.is_primary(),
                failed_attempts: binding.skipped.len(),
            },
            Some(ResolutionOutcome::Unresolved { attempts }) => BindingStatus::Unresolved {
                attempts: attempts.iter().map(AttemptSummary::from).collect(),
            },
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, BindingStatus::Bound { .. })
    }

    /// "Powered by ..." line for the planner page
    pub fn caption(&self) -> Option<String> {
        match self {
            BindingStatus::Bound {
                region,
                model,
                primary,
                ..
            } => Some(format!(
                "Powered by {} ({}) · {}",
                model,
                region,
                if *primary { "Latest" } else { "Fallback" }
            )),
            _ => None,
        }
    }
}

/// A plan request could not be answered
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("no working region/model combination is available")]
    Unresolved,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PlanError {
    /// Whether the same request may succeed if sent again
    pub fn is_transient(&self) -> bool {
        matches!(self, PlanError::Generation(e) if e.is_transient())
    }
}

/// Planning operations exposed to the web surface
#[async_trait]
pub trait PlanService: Send + Sync {
    /// Current discovery state
    async fn status(&self) -> BindingStatus;

    /// Run discovery again, replacing the held result
    async fn resolve(&self) -> BindingStatus;

    /// Generate an itinerary with the bound model
    async fn plan(&self, request: &TripRequest) -> Result<Generation, PlanError>;
}

/// Holds the discovered binding and plans trips with it
pub struct Planner<B: ServiceBackend> {
    resolver: Resolver,
    backend: B,
    outcome: RwLock<Option<Arc<ResolutionOutcome<B::Handle>>>>,
    resolving: Mutex<()>,
}

impl<B> Planner<B>
where
    B: ServiceBackend,
    B::Handle: GenerativeModel,
{
    pub fn new(resolver: Resolver, backend: B) -> Self {
        Self {
            resolver,
            backend,
            outcome: RwLock::new(None),
            resolving: Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Run discovery and hold the result until the next retry
    pub async fn discover(&self) -> BindingStatus {
        let _guard = self.resolving.lock().await;
        let outcome = Arc::new(self.resolver.resolve(&self.backend).await);
        let status = BindingStatus::from_outcome(Some(outcome.as_ref()));
        *self.outcome.write().await = Some(outcome);
        status
    }

    /// Held outcome, running discovery first if it never ran
    async fn ensure_discovered(&self) -> Arc<ResolutionOutcome<B::Handle>> {
        if let Some(outcome) = self.current().await {
            return outcome;
        }

        let _guard = self.resolving.lock().await;
        // Another request may have finished discovery while this one waited.
        if let Some(outcome) = self.current().await {
            return outcome;
        }

        let outcome = Arc::new(self.resolver.resolve(&self.backend).await);
        *self.outcome.write().await = Some(outcome.clone());
        outcome
    }

    async fn current(&self) -> Option<Arc<ResolutionOutcome<B::Handle>>> {
        self.outcome.read().await.clone()
    }
}

#[async_trait]
impl<B> PlanService for Planner<B>
where
    B: ServiceBackend + 'static,
    B::Handle: GenerativeModel + 'static,
{
    async fn status(&self) -> BindingStatus {
        let outcome = self.current().await;
        BindingStatus::from_outcome(outcome.as_deref())
    }

    async fn resolve(&self) -> BindingStatus {
        self.discover().await
    }

    async fn plan(&self, request: &TripRequest) -> Result<Generation, PlanError> {
        let outcome = self.ensure_discovered().await;

        let binding = outcome.binding().ok_or(PlanError::Unresolved)?;

        tracing::info!(
            "Planning trip to '{}' with model={} region={}",
            request.destination.trim(),
            binding.model,
            binding.region
        );

        binding
            .handle
            .generate(&request.prompt())
            .await
            .map_err(|e| {
                tracing::warn!("Generation failed with model={}: {}", binding.model, e);
                PlanError::from(e)
            })
    }
}
