//! Placeholder answer services
//!
//! Used by the daemon until real services are plugged in. Every call fails
//! with `NotConfigured`, which the orchestrator turns into the apology.

use async_trait::async_trait;

use super::orchestrator::{LookupService, QuestionAnswerer, ServiceError};

/// Answer service that has nothing behind it
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineServices;

#[async_trait]
impl QuestionAnswerer for OfflineServices {
    async fn ask(&self, _text: &str) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured("question"))
    }
}

#[async_trait]
impl LookupService for OfflineServices {
    async fn search(&self, _text: &str) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured("lookup"))
    }
}
