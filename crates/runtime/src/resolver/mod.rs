//! Region × model discovery
//!
//! The resolver walks the configured regions in order, connects to each, and
//! probes the candidate models in order inside every connected region. The
//! first probe that succeeds wins; every failure on the way is recorded so an
//! unresolved run can be diagnosed from its attempt log.

use async_trait::async_trait;

use crate::config::DiscoveryConfig;
use crate::types::{ConnectError, ModelId, ProbeError, Region, ResolutionError};

/// Remote service seen through the two calls discovery needs.
///
/// `connect` initialises the service for one region; `probe` checks that one
/// model can be used through an initialised context and hands back a usable
/// handle.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Per-region service context produced by `connect`
    type Context: Send + Sync;
    /// Usable model handle produced by `probe`
    type Handle: Send + Sync;

    async fn connect(&self, region: &Region) -> Result<Self::Context, ConnectError>;

    async fn probe(
        &self,
        context: &Self::Context,
        model: &ModelId,
    ) -> Result<Self::Handle, ProbeError>;
}

/// Why a single candidate was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Connect(ConnectError),
    Probe(ProbeError),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Connect(e) => write!(f, "connect failed: {}", e),
            AttemptFailure::Probe(e) => write!(f, "probe failed: {}", e),
        }
    }
}

/// One failed candidate in a discovery run.
///
/// `model` is `None` when the region itself could not be connected.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub region: Region,
    pub model: Option<ModelId>,
    pub failure: AttemptFailure,
}

impl Attempt {
    fn connect(region: &Region, error: ConnectError) -> Self {
        Self {
            region: region.clone(),
            model: None,
            failure: AttemptFailure::Connect(error),
        }
    }

    fn probe(region: &Region, model: &ModelId, error: ProbeError) -> Self {
        Self {
            region: region.clone(),
            model: Some(model.clone()),
            failure: AttemptFailure::Probe(error),
        }
    }

    pub fn is_connect_failure(&self) -> bool {
        matches!(self.failure, AttemptFailure::Connect(_))
    }
}

/// The winning (region, model) pair and its live handle
#[derive(Debug, Clone)]
pub struct Binding<H> {
    pub region: Region,
    pub model: ModelId,
    pub handle: H,
    /// Position of `region` in the candidate regions
    pub region_rank: usize,
    /// Position of `model` in the candidate models
    pub model_rank: usize,
    /// Failed candidates tried before this one
    pub skipped: Vec<Attempt>,
}

impl<H> Binding<H> {
    /// True when the very first candidate pair was usable
    pub fn is_primary(&self) -> bool {
        self.region_rank == 0 && self.model_rank == 0
    }
}

/// Result of one discovery run
#[derive(Debug, Clone)]
pub enum ResolutionOutcome<H> {
    Bound(Binding<H>),
    Unresolved { attempts: Vec<Attempt> },
}

impl<H> ResolutionOutcome<H> {
    pub fn is_bound(&self) -> bool {
        matches!(self, ResolutionOutcome::Bound(_))
    }

    pub fn binding(&self) -> Option<&Binding<H>> {
        match self {
            ResolutionOutcome::Bound(binding) => Some(binding),
            ResolutionOutcome::Unresolved { .. } => None,
        }
    }

    /// Every failed candidate, whether or not the run ended bound
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            ResolutionOutcome::Bound(binding) => &binding.skipped,
            ResolutionOutcome::Unresolved { attempts } => attempts,
        }
    }

    pub fn into_result(self) -> Result<Binding<H>, ResolutionError> {
        match self {
            ResolutionOutcome::Bound(binding) => Ok(binding),
            ResolutionOutcome::Unresolved { attempts } => {
                Err(ResolutionError::Exhausted { attempts })
            }
        }
    }
}

/// Ordered candidate lists to discover a binding from
#[derive(Debug, Clone, PartialEq)]
pub struct Resolver {
    regions: Vec<Region>,
    models: Vec<ModelId>,
}

impl Resolver {
    pub fn new(regions: Vec<Region>, models: Vec<ModelId>) -> Self {
        Self { regions, models }
    }

    /// Build the candidate lists from configuration.
    ///
    /// A configured safe-mode pair replaces discovery with that single pair.
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        match &config.safe_mode {
            Some(pinned) => {
                tracing::info!(
                    "Safe mode pinned to model={} region={}, discovery disabled",
                    pinned.model,
                    pinned.region
                );
                Self::new(vec![pinned.region.clone()], vec![pinned.model.clone()])
            }
            None => Self::new(config.regions.clone(), config.models.clone()),
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn models(&self) -> &[ModelId] {
        &self.models
    }

    /// Run discovery against `backend`.
    pub async fn resolve<B: ServiceBackend>(&self, backend: &B) -> ResolutionOutcome<B::Handle> {
        resolve(&self.regions, &self.models, backend).await
    }
}

/// Try region × model candidates in priority order and bind the first that works.
///
/// Regions form the outer loop and models the inner loop. A region that fails
/// to connect is recorded once and skipped; a model that fails to probe is
/// recorded and the next model is tried. Empty candidate lists resolve to
/// `Unresolved` without touching the backend.
pub async fn resolve<B: ServiceBackend>(
    regions: &[Region],
    models: &[ModelId],
    backend: &B,
) -> ResolutionOutcome<B::Handle> {
    let mut attempts = Vec::new();

    if regions.is_empty() || models.is_empty() {
        tracing::warn!(
            "Discovery skipped: {} region(s), {} model(s) configured",
            regions.len(),
            models.len()
        );
        return ResolutionOutcome::Unresolved { attempts };
    }

    for (region_rank, region) in regions.iter().enumerate() {
        let context = match backend.connect(region).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Discovery: region={} connect failed: {}", region, e);
                attempts.push(Attempt::connect(region, e));
                continue;
            }
        };

        for (model_rank, model) in models.iter().enumerate() {
            match backend.probe(&context, model).await {
                Ok(handle) => {
                    tracing::info!(
                        "Discovery bound model={} region={} after {} failed attempt(s)",
                        model,
                        region,
                        attempts.len()
                    );
                    return ResolutionOutcome::Bound(Binding {
                        region: region.clone(),
                        model: model.clone(),
                        handle,
                        region_rank,
                        model_rank,
                        skipped: attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Discovery: region={} model={} probe failed: {}",
                        region,
                        model,
                        e
                    );
                    attempts.push(Attempt::probe(region, model, e));
                }
            }
        }
    }

    tracing::error!(
        "Discovery exhausted {} region(s) x {} model(s) with {} failed attempt(s)",
        regions.len(),
        models.len(),
        attempts.len()
    );
    ResolutionOutcome::Unresolved { attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Deterministic backend: regions in `up` connect, (region, model) pairs in
    /// `working` probe successfully. Every call is logged.
    #[derive(Default)]
    struct StubBackend {
        up: HashSet<String>,
        working: HashSet<(String, String)>,
        calls: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(up: &[&str], working: &[(&str, &str)]) -> Self {
            Self {
                up: up.iter().map(|r| r.to_string()).collect(),
                working: working
                    .iter()
                    .map(|(r, m)| (r.to_string(), m.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServiceBackend for StubBackend {
        type Context = Region;
        type Handle = String;

        async fn connect(&self, region: &Region) -> Result<Region, ConnectError> {
            self.calls.lock().unwrap().push(format!("connect:{}", region));
            if self.up.contains(region.as_str()) {
                Ok(region.clone())
            } else {
                Err(ConnectError::Unreachable {
                    region: region.clone(),
                    reason: "down".to_string(),
                })
            }
        }

        async fn probe(&self, context: &Region, model: &ModelId) -> Result<String, ProbeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("probe:{}/{}", context, model));
            let key = (context.as_str().to_string(), model.as_str().to_string());
            if self.working.contains(&key) {
                Ok(format!("{}@{}", model, context))
            } else {
                Err(ProbeError::ModelUnavailable {
                    region: context.clone(),
                    model: model.clone(),
                })
            }
        }
    }

    fn regions(names: &[&str]) -> Vec<Region> {
        names.iter().map(|n| Region::from(*n)).collect()
    }

    fn models(names: &[&str]) -> Vec<ModelId> {
        names.iter().map(|n| ModelId::from(*n)).collect()
    }

    #[tokio::test]
    async fn binds_first_working_pair_in_priority_order() {
        // Only the third region's second model works.
        let backend = StubBackend::new(&["r1", "r2", "r3"], &[("r3", "m2"), ("r3", "m3")]);
        let outcome = resolve(
            &regions(&["r1", "r2", "r3"]),
            &models(&["m1", "m2", "m3"]),
            &backend,
        )
        .await;

        let binding = outcome.binding().expect("should bind");
        assert_eq!(binding.region.as_str(), "r3");
        assert_eq!(binding.model.as_str(), "m2");
        assert_eq!(binding.handle, "m2@r3");
        assert_eq!((binding.region_rank, binding.model_rank), (2, 1));
        assert!(!binding.is_primary());
        // r1 and r2 each tried all three models, r3 failed once before binding
        assert_eq!(binding.skipped.len(), 7);
        assert!(!backend.calls().contains(&"probe:r3/m3".to_string()));
    }

    #[tokio::test]
    async fn earlier_region_wins_over_later_region() {
        let backend = StubBackend::new(&["r1", "r2"], &[("r1", "m2"), ("r2", "m1")]);
        let outcome = resolve(&regions(&["r1", "r2"]), &models(&["m1", "m2"]), &backend).await;

        let binding = outcome.binding().unwrap();
        assert_eq!(binding.region.as_str(), "r1");
        assert_eq!(binding.model.as_str(), "m2");
        assert!(!backend.calls().iter().any(|c| c.contains("r2")));
    }

    #[tokio::test]
    async fn all_connects_failing_records_one_attempt_per_region() {
        let backend = StubBackend::new(&[], &[]);
        let outcome = resolve(
            &regions(&["r1", "r2", "r3"]),
            &models(&["m1", "m2"]),
            &backend,
        )
        .await;

        assert!(!outcome.is_bound());
        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|a| a.is_connect_failure()));
        assert!(attempts.iter().all(|a| a.model.is_none()));
        assert!(backend.calls().iter().all(|c| c.starts_with("connect:")));
    }

    #[tokio::test]
    async fn exhausted_region_moves_on_to_the_next() {
        let backend = StubBackend::new(&["r1", "r2"], &[("r2", "m1")]);
        let outcome = resolve(&regions(&["r1", "r2"]), &models(&["m1", "m2"]), &backend).await;

        let binding = outcome.binding().unwrap();
        assert_eq!(binding.region.as_str(), "r2");
        assert_eq!(binding.model.as_str(), "m1");

        let skipped: Vec<_> = binding
            .skipped
            .iter()
            .map(|a| (a.region.to_string(), a.model.as_ref().map(|m| m.to_string())))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("r1".to_string(), Some("m1".to_string())),
                ("r1".to_string(), Some("m2".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn unresolved_logs_every_pair_tried() {
        let backend = StubBackend::new(&["r1", "r2"], &[]);
        let outcome = resolve(&regions(&["r1", "r2"]), &models(&["m1", "m2"]), &backend).await;

        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 4);
        assert!(attempts.iter().all(|a| !a.is_connect_failure()));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.attempts().len(), 4);
    }

    #[tokio::test]
    async fn resolution_is_idempotent_with_stable_backend() {
        let backend = StubBackend::new(&["r2"], &[("r2", "m2")]);
        let regions = regions(&["r1", "r2"]);
        let models = models(&["m1", "m2"]);

        let first = resolve(&regions, &models, &backend).await;
        let second = resolve(&regions, &models, &backend).await;

        let (a, b) = (first.binding().unwrap(), second.binding().unwrap());
        assert_eq!((&a.region, &a.model, &a.handle), (&b.region, &b.model, &b.handle));
        assert_eq!(a.skipped, b.skipped);
    }

    #[tokio::test]
    async fn empty_candidates_resolve_without_calls() {
        let backend = StubBackend::new(&["r1"], &[("r1", "m1")]);

        let outcome = resolve(&[], &models(&["m1"]), &backend).await;
        assert!(!outcome.is_bound());
        assert!(outcome.attempts().is_empty());

        let outcome = resolve(&regions(&["r1"]), &[], &backend).await;
        assert!(!outcome.is_bound());
        assert!(outcome.attempts().is_empty());

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn second_model_in_first_region() {
        let backend = StubBackend::new(&["a"], &[("a", "m2")]);
        let outcome = resolve(&regions(&["a", "b"]), &models(&["m1", "m2"]), &backend).await;

        let binding = outcome.binding().unwrap();
        assert_eq!(binding.region.as_str(), "a");
        assert_eq!(binding.model.as_str(), "m2");
        assert_eq!(backend.calls(), vec!["connect:a", "probe:a/m1", "probe:a/m2"]);
    }

    #[tokio::test]
    async fn two_unreachable_regions_give_two_connect_errors() {
        let backend = StubBackend::new(&[], &[]);
        let outcome = resolve(&regions(&["a", "b"]), &models(&["m1"]), &backend).await;

        match outcome {
            ResolutionOutcome::Unresolved { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(matches!(attempts[0].failure, AttemptFailure::Connect(_)));
                assert!(matches!(attempts[1].failure, AttemptFailure::Connect(_)));
                assert_eq!(attempts[0].region.as_str(), "a");
                assert_eq!(attempts[1].region.as_str(), "b");
            }
            ResolutionOutcome::Bound(_) => panic!("nothing should bind"),
        }
    }

    #[tokio::test]
    async fn primary_binding_is_flagged() {
        let backend = StubBackend::new(&["a"], &[("a", "m1")]);
        let resolver = Resolver::new(regions(&["a"]), models(&["m1", "m2"]));
        let outcome = resolver.resolve(&backend).await;

        let binding = outcome.binding().unwrap();
        assert!(binding.is_primary());
        assert!(binding.skipped.is_empty());
    }

    #[test]
    fn safe_mode_replaces_candidate_lists() {
        let mut config = DiscoveryConfig::default();
        config.safe_mode = Some(crate::config::PinnedCandidate {
            region: Region::from("us-central1"),
            model: ModelId::from("gemini-1.5-flash-001"),
        });

        let resolver = Resolver::from_config(&config);
        assert_eq!(resolver.regions(), &[Region::from("us-central1")]);
        assert_eq!(resolver.models(), &[ModelId::from("gemini-1.5-flash-001")]);

        config.safe_mode = None;
        let resolver = Resolver::from_config(&config);
        assert_eq!(resolver.regions(), config.regions.as_slice());
        assert_eq!(resolver.models(), config.models.as_slice());
    }
}
