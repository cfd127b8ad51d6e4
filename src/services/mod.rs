//! Business logic services

pub mod email;
pub mod fines;
pub mod loans;
pub mod notifier;

use chrono::Duration;
use std::sync::Arc;

use crate::{
    config::{EmailConfig, LoansConfig, NotifierConfig},
    repository::Store,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub loans: loans::LoansService,
    pub sender: Arc<dyn email::NotificationSender>,
}

impl Services {
    /// Create all services on top of the given store
    pub fn new(store: Arc<dyn Store>, loans_config: &LoansConfig, email_config: EmailConfig) -> Self {
        let sender: Arc<dyn email::NotificationSender> = if email_config.enabled {
            Arc::new(email::EmailService::new(email_config))
        } else {
            Arc::new(email::LogSender)
        };

        Self::with_sender(store, loans_config, sender)
    }

    /// Same as [`Services::new`] with an explicit notification sender
    pub fn with_sender(
        store: Arc<dyn Store>,
        loans_config: &LoansConfig,
        sender: Arc<dyn email::NotificationSender>,
    ) -> Self {
        let fine_policy = fines::FinePolicy::new(loans_config.fine_per_day);
        let loan_period = Duration::days(loans_config.period_days.max(1));

        Self {
            loans: loans::LoansService::new(store.clone(), fine_policy, loan_period),
            store,
            sender,
        }
    }

    /// Build the due-date notifier sharing this store and sender
    pub fn notifier(&self, config: &NotifierConfig) -> notifier::DueDateNotifier {
        notifier::DueDateNotifier::new(self.store.clone(), self.sender.clone(), config)
    }
}
