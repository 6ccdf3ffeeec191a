//! Common imports for embedding the planner.
//!
//! ```ignore
//! use wayfarer_runtime::prelude::*;
//! ```

// Discovery
pub use crate::resolver::{
    Attempt, AttemptFailure, Binding, ResolutionOutcome, Resolver, ServiceBackend,
};

// Generation
pub use crate::generation::{Generation, GenerativeModel, SearchTool, SearchToolPreference};

// Planning and access control
pub use crate::licensing::{LicenseGrant, LicenseVerifier};
pub use crate::planner::{BindingStatus, PlanError, PlanService, Planner, TripRequest};
pub use crate::session::{SessionState, SessionStore};

// Identity and errors
pub use crate::types::{
    ConnectError, GenerationError, LicenseError, ModelId, ProbeError, Region, RuntimeError,
};

// Web surface (feature-gated)
#[cfg(feature = "web")]
pub use crate::web::{AppState, WebServer};
