//! Due-date reminder sweep.
//!
//! A background task that periodically picks active, not yet notified loans
//! due within the reminder window, emails the borrower and then flags the
//! loan as notified. The flag is written only after a successful dispatch,
//! so a failed send is retried on the next sweep (at-least-once delivery).
//! No store lock is held while the message is being sent.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

use crate::{
    config::NotifierConfig,
    error::AppResult,
    models::{book::Book, loan::Loan, user::User},
    repository::Store,
    services::email::NotificationSender,
};

const REMINDER_SUBJECT: &str = "Reminder: Return Your Borrowed Book";

/// Outcome counters of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub notified: usize,
    pub failed: usize,
    /// Returned or notified by someone else between selection and flagging
    pub skipped: usize,
}

pub struct DueDateNotifier {
    store: Arc<dyn Store>,
    sender: Arc<dyn NotificationSender>,
    interval: std::time::Duration,
    window: Duration,
}

impl DueDateNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        sender: Arc<dyn NotificationSender>,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            store,
            sender,
            interval: std::time::Duration::from_secs(config.interval_minutes.max(1) * 60),
            window: Duration::hours(config.window_hours),
        }
    }

    /// Sweep forever on the configured interval. The first sweep runs at once.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            window_hours = self.window.num_hours(),
            "Due-date notifier started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.sweep(Utc::now()).await {
                Ok(report) if report.selected > 0 => {
                    tracing::info!(?report, "Due-date sweep finished");
                }
                Ok(_) => tracing::debug!("Due-date sweep: nothing to remind"),
                Err(e) => tracing::warn!(error = %e, "Due-date sweep could not query loans"),
            }
        }
    }

    /// One pass over the loans due before `now + window`
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let due = self.store.loans_due_before(now + self.window).await?;

        let mut report = SweepReport {
            selected: due.len(),
            ..SweepReport::default()
        };

        for loan in &due {
            match self.remind(loan).await {
                Ok(true) => report.notified += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        loan_id = loan.id,
                        user_id = loan.user_id,
                        error = %e,
                        "Due-date reminder failed, will retry on next sweep"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn remind(&self, loan: &Loan) -> AppResult<bool> {
        let user = self.store.get_user(loan.user_id).await?;
        let book = self.store.get_book(loan.book_id).await?;

        let body = reminder_body(&user, &book, loan);
        self.sender.send(&user.email, REMINDER_SUBJECT, &body).await?;

        self.store.mark_notified(loan.id).await
    }
}

fn reminder_body(user: &User, book: &Book, loan: &Loan) -> String {
    format!(
        "Dear {},\n\nplease return the book \"{}\" by {}.\n\nThank you!",
        user.username,
        book.title,
        loan.due_date.format("%Y-%m-%d %H:%M UTC"),
    )
}
