use std::sync::Arc;

use super::domain::{ProviderId, VerificationStatus};
use super::repository::{RepositoryError, VerificationRegistry};

/// Marketplace access check. Reads the registry on every call; verification can change
/// between requests.
#[derive(Clone)]
pub struct VerificationGate {
    registry: Arc<dyn VerificationRegistry>,
}

impl VerificationGate {
    pub fn new(registry: Arc<dyn VerificationRegistry>) -> Self {
        Self { registry }
    }

    pub fn can_access_marketplace(&self, provider_id: &ProviderId) -> Result<bool, RepositoryError> {
        let status = self.registry.verification_status(provider_id)?;
        Ok(status == Some(VerificationStatus::Verified))
    }
}
