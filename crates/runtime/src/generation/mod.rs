//! Generative model capability
//!
//! Discovery produces a handle implementing [`GenerativeModel`]; the planner
//! only ever talks to that trait. The Vertex AI adapter is the production
//! implementation.

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{GenerationError, ModelId, Region};

pub mod search_tool;
pub mod vertex;

pub use search_tool::{SearchTool, SearchToolPreference};
pub use vertex::{VertexBackend, VertexContext, VertexModel};

/// Text produced by a grounded model call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    /// Markdown answer
    pub text: String,
    /// Search-suggestion fragment supplied by the service, already HTML
    pub grounding_html: Option<String>,
    /// Queries the model issued against web search
    pub search_queries: Vec<String>,
}

/// A bound, ready-to-use model
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_id(&self) -> &ModelId;

    fn region(&self) -> &Region;

    /// Grounding tool negotiated for this model
    fn search_tool(&self) -> SearchTool;

    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError>;
}

/// Shorten a response body for inclusion in an error message
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let body = body.trim();
    if body.chars().count() <= LIMIT {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(LIMIT).collect();
    cut.push('…');
    cut
}
