//! Wayfarer runtime
//!
//! A license-gated trip planner backed by a hosted LLM with web-search
//! grounding. The core of the crate is [`resolver`], which discovers a working
//! region and model pair at startup and falls back through the configured
//! candidates when the preferred ones are unavailable.

pub mod config;
pub mod generation;
pub mod licensing;
pub mod planner;
pub mod prelude;
pub mod resolver;
pub mod session;
pub mod types;

#[cfg(feature = "web")]
pub mod web;

pub use config::{AppConfig, ConfigError};
pub use generation::{Generation, GenerativeModel, SearchTool, VertexBackend};
pub use licensing::{GumroadVerifier, LicenseGrant, LicenseVerifier};
pub use planner::{BindingStatus, PlanError, PlanService, Planner, TripRequest};
pub use resolver::{resolve, ResolutionOutcome, Resolver, ServiceBackend};
pub use session::{SessionState, SessionStore};
pub use types::*;

use std::sync::Arc;

/// Crate version reported by health checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fully wired application: planner, license gate and session table
pub struct Wayfarer {
    pub planner: Arc<Planner<VertexBackend>>,
    pub verifier: Arc<GumroadVerifier>,
    pub sessions: Arc<SessionStore>,
    config: Arc<AppConfig>,
}

impl Wayfarer {
    /// Validate `config` and build every component from it
    pub fn new(config: AppConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let instruction = config
            .service
            .system_instruction
            .clone()
            .unwrap_or_else(|| planner::DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let backend = VertexBackend::new(&config.service, instruction)?;
        let resolver = Resolver::from_config(&config.discovery);
        let verifier = GumroadVerifier::new(&config.licensing)?;
        let sessions = SessionStore::new(config.server.session_cookie.clone());

        tracing::info!(
            "Wayfarer runtime configured: project={} regions={} models={}",
            config.service.project_id,
            resolver.regions().len(),
            resolver.models().len()
        );

        Ok(Self {
            planner: Arc::new(Planner::new(resolver, backend)),
            verifier: Arc::new(verifier),
            sessions: Arc::new(sessions),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run startup discovery
    pub async fn discover(&self) -> BindingStatus {
        self.planner.discover().await
    }

    #[cfg(feature = "web")]
    pub fn app_state(&self) -> web::AppState {
        web::AppState {
            planner: self.planner.clone(),
            verifier: self.verifier.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Serve the planner until Ctrl-C
    #[cfg(feature = "web")]
    pub async fn serve(&self) -> Result<(), RuntimeError> {
        web::WebServer::new(self.config.server.clone(), self.app_state())
            .start()
            .await
    }
}
