//! Adapter exposing the report backends as the engine's readiness probe.

use std::sync::Arc;

use async_trait::async_trait;

use incident::{ReadinessProbeError, ReportLink, ReportReadiness};

use crate::backend::ReportBackend;

/// Answers "is this report finished" by asking the owning backend.
pub struct BackendReadiness {
    backends: Vec<Arc<dyn ReportBackend>>,
}

impl BackendReadiness {
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn ReportBackend>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl ReportReadiness for BackendReadiness {
    async fn is_ready(&self, link: &ReportLink) -> Result<bool, ReadinessProbeError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.kind() == link.backend)
            .ok_or_else(|| {
                ReadinessProbeError(format!("no backend wired for {}", link.backend))
            })?;
        backend
            .is_ready(link)
            .await
            .map_err(|e| ReadinessProbeError(e.to_string()))
    }
}
