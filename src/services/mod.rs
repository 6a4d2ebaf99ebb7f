//! Business logic services

pub mod allocator;
pub mod audit;
pub mod inventory;
pub mod lending;
pub mod notifications;
pub mod penalties;
pub mod settings;

use std::sync::Arc;

use crate::repository::Repository;

use audit::AuditWriter;
use notifications::Notifier;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub allocator: allocator::AllocatorService,
    pub lending: lending::LendingService,
    pub penalties: penalties::PenaltyService,
    pub settings: settings::SettingsService,
}

impl Services {
    /// Create all services with the given repository and collaborators
    pub fn new(
        repository: Repository,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditWriter>,
    ) -> Self {
        Self {
            allocator: allocator::AllocatorService::new(
                repository.clone(),
                notifier.clone(),
                audit.clone(),
            ),
            lending: lending::LendingService::new(
                repository.clone(),
                notifier.clone(),
                audit.clone(),
            ),
            penalties: penalties::PenaltyService::new(repository.clone(), notifier, audit),
            settings: settings::SettingsService::new(repository),
        }
    }
}
