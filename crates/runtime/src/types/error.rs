//! Error taxonomy for the Wayfarer runtime
//!
//! Every remote boundary (connect, probe, generate, verify) returns one of the
//! concern-specific errors below. Connection and probe failures are recorded by
//! the resolver and never abort a discovery run on their own.

use thiserror::Error;

use super::{ModelId, Region};
use crate::config::ConfigError;
use crate::resolver::Attempt;

/// Main runtime error type
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("License error: {0}")]
    License(#[from] LicenseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A candidate region could not be reached or initialised
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error("region {region} unreachable: {reason}")]
    Unreachable { region: Region, reason: String },

    #[error("region {region} rejected initialisation ({status}): {body}")]
    Rejected {
        region: Region,
        status: u16,
        body: String,
    },
}

/// A candidate model is not usable in an otherwise connected region
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("model {model} is not available in {region}")]
    ModelUnavailable { region: Region, model: ModelId },

    #[error("model {model} in {region} rejected the probe ({status}): {body}")]
    Rejected {
        region: Region,
        model: ModelId,
        status: u16,
        body: String,
    },

    #[error("model {model} in {region} unreachable: {reason}")]
    Unreachable {
        region: Region,
        model: ModelId,
        reason: String,
    },
}

/// Terminal outcome of a discovery run
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("no working region/model combination after {} attempt(s)", .attempts.len())]
    Exhausted { attempts: Vec<Attempt> },
}

impl ResolutionError {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            ResolutionError::Exhausted { attempts } => attempts,
        }
    }
}

/// The bound model failed to produce an answer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse generation response: {0}")]
    Parse(String),

    #[error("prompt blocked by the service: {0}")]
    Blocked(String),

    #[error("the model returned no text")]
    EmptyResponse,
}

impl GenerationError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Request(_) => true,
            GenerationError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// The license gate refused entry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LicenseError {
    #[error("no license key supplied")]
    EmptyKey,

    #[error("license key is not valid for this product")]
    Invalid,

    #[error("license purchase has been refunded")]
    Refunded,

    #[error("license verification unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected license verification response: {0}")]
    Malformed(String),
}

impl LicenseError {
    /// Whether the key itself was judged, as opposed to the check failing
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            LicenseError::EmptyKey | LicenseError::Invalid | LicenseError::Refunded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_reports_status() {
        let err = ConnectError::Rejected {
            region: Region::from("europe-west4"),
            status: 403,
            body: "denied".to_string(),
        };
        assert!(err.to_string().contains("europe-west4"));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn generation_transience() {
        assert!(GenerationError::Request("reset".into()).is_transient());
        assert!(GenerationError::Api {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(GenerationError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!GenerationError::Api {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!GenerationError::EmptyResponse.is_transient());
    }

    #[test]
    fn license_denials_are_distinguished_from_outages() {
        assert!(LicenseError::Invalid.is_denial());
        assert!(LicenseError::Refunded.is_denial());
        assert!(LicenseError::EmptyKey.is_denial());
        assert!(!LicenseError::Unavailable("dns".into()).is_denial());
        assert!(!LicenseError::Malformed("html".into()).is_denial());
    }

    #[test]
    fn runtime_error_wraps_concerns() {
        let err: RuntimeError = LicenseError::Refunded.into();
        assert_eq!(
            err.to_string(),
            "License error: license purchase has been refunded"
        );

        let err: RuntimeError = ResolutionError::Exhausted { attempts: vec![] }.into();
        assert!(err.to_string().contains("0 attempt(s)"));
    }
}
