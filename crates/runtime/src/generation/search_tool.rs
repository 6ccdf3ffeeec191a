//! Web-search grounding tool selection

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// The grounding tool attached to a model.
///
/// Newer model generations take the `googleSearch` tool; older ones only
/// understand `googleSearchRetrieval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTool {
    Modern,
    Legacy,
}

impl SearchTool {
    /// Tool declaration as sent in a request's `tools` array
    pub fn declaration(&self) -> serde_json::Value {
        match self {
            SearchTool::Modern => serde_json::json!({ "googleSearch": {} }),
            SearchTool::Legacy => serde_json::json!({ "googleSearchRetrieval": {} }),
        }
    }
}

impl std::fmt::Display for SearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchTool::Modern => write!(f, "Google Search"),
            SearchTool::Legacy => write!(f, "Google Search Retrieval"),
        }
    }
}

/// Configured preference for the grounding tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchToolPreference {
    /// Modern tool first, legacy tool if the model rejects it
    #[default]
    Auto,
    Modern,
    Legacy,
}

impl SearchToolPreference {
    /// Tools to offer a model, in the order they are tried
    pub fn candidates(&self) -> &'static [SearchTool] {
        match self {
            SearchToolPreference::Auto => &[SearchTool::Modern, SearchTool::Legacy],
            SearchToolPreference::Modern => &[SearchTool::Modern],
            SearchToolPreference::Legacy => &[SearchTool::Legacy],
        }
    }
}

impl std::str::FromStr for SearchToolPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchToolPreference::Auto),
            "modern" => Ok(SearchToolPreference::Modern),
            "legacy" => Ok(SearchToolPreference::Legacy),
            other => Err(ConfigError::InvalidValue {
                key: "service.search_tool".to_string(),
                reason: format!("expected auto, modern or legacy, got '{}'", other),
            }),
        }
    }
}
