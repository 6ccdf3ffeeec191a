//! Vertex AI adapter
//!
//! `connect` looks up the project location for a region, `probe` counts the
//! tokens of a one-word prompt against the candidate model (negotiating the
//! grounding tool on the way) and `generate` calls `generateContent`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{truncate_body, Generation, GenerativeModel, SearchTool};
use crate::config::ServiceConfig;
use crate::resolver::ServiceBackend;
use crate::types::{ConnectError, GenerationError, ModelId, ProbeError, Region, RuntimeError};

/// Discovery backend for Vertex AI publisher models
pub struct VertexBackend {
    client: reqwest::Client,
    service: ServiceConfig,
    access_token: Option<Arc<str>>,
    system_instruction: Arc<str>,
}

impl VertexBackend {
    pub fn new(
        service: &ServiceConfig,
        system_instruction: impl Into<String>,
    ) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(service.timeout_secs))
            .build()
            .map_err(|e| RuntimeError::Internal(format!("HTTP client init: {}", e)))?;

        if service.access_token.is_none() {
            tracing::warn!("No service access token configured; requests are sent unauthenticated");
        }

        Ok(Self {
            client,
            access_token: service.access_token.as_deref().map(Arc::from),
            service: service.clone(),
            system_instruction: Arc::from(system_instruction.into()),
        })
    }

    fn location_url(&self, region: &Region) -> String {
        format!(
            "{}/projects/{}/locations/{}",
            self.service.endpoint_for(region),
            self.service.project_id,
            region
        )
    }
}

fn authorize(request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Service context for one connected region
#[derive(Debug, Clone)]
pub struct VertexContext {
    region: Region,
    location_url: String,
}

impl VertexContext {
    pub fn region(&self) -> &Region {
        &self.region
    }

    fn model_url(&self, model: &ModelId, method: &str) -> String {
        format!(
            "{}/publishers/google/models/{}:{}",
            self.location_url, model, method
        )
    }
}

#[async_trait]
impl ServiceBackend for VertexBackend {
    type Context = VertexContext;
    type Handle = VertexModel;

    async fn connect(&self, region: &Region) -> Result<VertexContext, ConnectError> {
        let location_url = self.location_url(region);

        let response = authorize(self.client.get(&location_url), self.access_token.as_deref())
            .send()
            .await
            .map_err(|e| ConnectError::Unreachable {
                region: region.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::Rejected {
                region: region.clone(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        tracing::debug!("Connected to region {}", region);
        Ok(VertexContext {
            region: region.clone(),
            location_url,
        })
    }

    async fn probe(
        &self,
        context: &VertexContext,
        model: &ModelId,
    ) -> Result<VertexModel, ProbeError> {
        let url = context.model_url(model, "countTokens");
        let mut rejection = None;

        for tool in self.service.search_tool.candidates() {
            let body = ContentRequest {
                contents: vec![Content::user("ping")],
                system_instruction: None,
                tools: vec![tool.declaration()],
            };

            let response = authorize(self.client.post(&url), self.access_token.as_deref())
                .json(&body)
                .send()
                .await
                .map_err(|e| ProbeError::Unreachable {
                    region: context.region.clone(),
                    model: model.clone(),
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(VertexModel {
                    client: self.client.clone(),
                    generate_url: context.model_url(model, "generateContent"),
                    region: context.region.clone(),
                    model: model.clone(),
                    tool: *tool,
                    system_instruction: self.system_instruction.clone(),
                    access_token: self.access_token.clone(),
                });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(ProbeError::ModelUnavailable {
                    region: context.region.clone(),
                    model: model.clone(),
                });
            }

            let text = response.text().await.unwrap_or_default();
            let error = ProbeError::Rejected {
                region: context.region.clone(),
                model: model.clone(),
                status: status.as_u16(),
                body: truncate_body(&text),
            };

            // A 400 usually means the tool declaration is not understood by
            // this model generation, so the next tool variant gets a chance.
            if status == StatusCode::BAD_REQUEST {
                tracing::info!(
                    "Model {} in {} rejected the {} tool",
                    model,
                    context.region,
                    tool
                );
                rejection = Some(error);
                continue;
            }

            return Err(error);
        }

        Err(rejection.unwrap_or(ProbeError::ModelUnavailable {
            region: context.region.clone(),
            model: model.clone(),
        }))
    }
}

/// Handle to a probed model with its negotiated grounding tool
#[derive(Clone)]
pub struct VertexModel {
    client: reqwest::Client,
    generate_url: String,
    region: Region,
    model: ModelId,
    tool: SearchTool,
    system_instruction: Arc<str>,
    access_token: Option<Arc<str>>,
}

impl std::fmt::Debug for VertexModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexModel")
            .field("region", &self.region)
            .field("model", &self.model)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerativeModel for VertexModel {
    fn model_id(&self) -> &ModelId {
        &self.model
    }

    fn region(&self) -> &Region {
        &self.region
    }

    fn search_tool(&self) -> SearchTool {
        self.tool
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let body = ContentRequest {
            contents: vec![Content::user(prompt)],
            system_instruction: Some(Content::system(&self.system_instruction)),
            tools: vec![self.tool.declaration()],
        };

        let start = Instant::now();

        let response = authorize(self.client.post(&self.generate_url), self.access_token.as_deref())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let latency = start.elapsed();

        if let Some(usage) = &payload.usage_metadata {
            tracing::info!(
                "LLM usage: model={} region={} prompt_tokens={} candidate_tokens={} total_tokens={} latency={:?}",
                self.model,
                self.region,
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count,
                latency,
            );
        }

        payload.into_generation()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

impl<'a> Content<'a> {
    fn user(text: &'a str) -> Self {
        Self {
            role: Some("user"),
            parts: vec![TextPart { text }],
        }
    }

    fn system(text: &'a str) -> Self {
        Self {
            role: None,
            parts: vec![TextPart { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    search_entry_point: Option<SearchEntryPoint>,
    #[serde(default)]
    web_search_queries: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEntryPoint {
    rendered_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl GenerateContentResponse {
    fn into_generation(self) -> Result<Generation, GenerationError> {
        let candidate = match self.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => {
                return Err(match self.prompt_feedback.and_then(|f| f.block_reason) {
                    Some(reason) => GenerationError::Blocked(reason),
                    None => GenerationError::EmptyResponse,
                })
            }
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(match candidate.finish_reason {
                Some(reason) if reason != "STOP" => GenerationError::Blocked(reason),
                _ => GenerationError::EmptyResponse,
            });
        }

        let (grounding_html, search_queries) = match candidate.grounding_metadata {
            Some(meta) => (
                meta.search_entry_point
                    .and_then(|e| e.rendered_content)
                    .filter(|html| !html.trim().is_empty()),
                meta.web_search_queries,
            ),
            None => (None, Vec::new()),
        };

        Ok(Generation {
            text,
            grounding_html,
            search_queries,
        })
    }
}
