//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Reject pipelines that cannot produce a meaningful run
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("stage #{index} has an empty name")]
    EmptyStageName { index: usize },

    #[error("duplicate stage name {0:?}")]
    DuplicateStage(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics.address",
            value: config.metrics.address.clone(),
        });
    }

    if config.pipeline.stages.is_empty() {
        errors.push(ValidationError::EmptyPipeline);
    }

    let mut seen = HashSet::new();
    for (index, stage) in config.pipeline.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            errors.push(ValidationError::EmptyStageName { index });
        } else if !seen.insert(stage.name.as_str()) {
            errors.push(ValidationError::DuplicateStage(stage.name.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.request_secs"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::NotPositive("limits.max_body_bytes"));
    }
    if config.tracing.batch_size == 0 {
        errors.push(ValidationError::NotPositive("tracing.batch_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StageConfig;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_stage_names() {
        let mut config = ServiceConfig::default();
        config.pipeline.stages = vec![
            StageConfig::new("a", 1),
            StageConfig::new(" ", 1),
            StageConfig::new("a", 1),
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyStageName { index: 1 },
                ValidationError::DuplicateStage("a".into()),
            ]
        );
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = ServiceConfig::default();
        config.metrics.address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.metrics.enabled = true;
        assert!(matches!(
            validate_config(&config).unwrap_err().as_slice(),
            [ValidationError::InvalidAddress { field: "metrics.address", .. }]
        ));
    }

    #[test]
    fn test_zero_values() {
        let mut config = ServiceConfig::default();
        config.timeouts.request_secs = 0;
        config.limits.max_body_bytes = 0;
        config.tracing.batch_size = 0;
        assert_eq!(validate_config(&config).unwrap_err().len(), 3);
    }

    #[test]
    fn test_collector_endpoint_not_checked_here() {
        let mut config = ServiceConfig::default();
        config.tracing.endpoint = "not a url".into();
        assert!(validate_config(&config).is_ok());
    }
}
