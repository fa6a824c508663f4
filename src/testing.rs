//! Assertion helpers for tests that drive mail through the queue.
//!
//! Outbox assertions take a [`LocalMailer`]; a registry's shared outbox is
//! reachable through [`BackendRegistry::local_mailer`](crate::BackendRegistry::local_mailer).
//! Queue assertions take an [`InMemoryQueue`].
//!
//! ```rust,ignore
//! use mail_dispatch::testing::*;
//!
//! submission.submit(&emails, &options).await?;
//! assert_tasks_queued(&queue, 2);
//!
//! worker.run_pending().await;
//! let outbox = registry.local_mailer();
//! assert_email_count(&outbox, 11);
//! assert_email_to(&outbox, "user@example.com");
//! assert_email_subject_matches(&outbox, r"^Invoice #\d+$");
//! ```

use regex::Regex;

use crate::providers::LocalMailer;
use crate::queue::InMemoryQueue;
use crate::storage::StoredEmail;

fn summary(emails: &[StoredEmail]) -> String {
    if emails.is_empty() {
        return "  (outbox is empty)".to_string();
    }

    emails
        .iter()
        .enumerate()
        .map(|(i, stored)| {
            let to = stored
                .email
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("  {}. To: [{}], Subject: \"{}\"", i + 1, to, stored.email.subject)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Subjects of every delivered email, in delivery order.
pub fn outbox_subjects(mailer: &LocalMailer) -> Vec<String> {
    mailer
        .emails()
        .into_iter()
        .map(|stored| stored.email.subject)
        .collect()
}

/// # Panics
///
/// Panics unless exactly `expected` emails were delivered.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let emails = mailer.emails();
    assert!(
        emails.len() == expected,
        "Expected {} email(s) to be delivered, but {} were.\n\nOutbox:\n{}",
        expected,
        emails.len(),
        summary(&emails)
    );
}

/// # Panics
///
/// Panics if anything was delivered.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    assert_email_count(mailer, 0);
}

/// Assert that an email was delivered to `email` (case-insensitive).
///
/// # Panics
///
/// Panics if no delivered email lists the address in `to`.
pub fn assert_email_to(mailer: &LocalMailer, email: &str) {
    let emails = mailer.emails();
    assert!(
        mailer.sent_to(email),
        "Expected an email to be delivered to '{}'.\n\nOutbox:\n{}",
        email,
        summary(&emails)
    );
}

/// Assert that some delivered email's subject matches `pattern`.
///
/// # Panics
///
/// Panics if the pattern is invalid or nothing matches.
pub fn assert_email_subject_matches(mailer: &LocalMailer, pattern: &str) {
    let re = Regex::new(pattern).unwrap_or_else(|e| panic!("Invalid regex '{}': {}", pattern, e));
    let emails = mailer.emails();
    assert!(
        emails.iter().any(|stored| re.is_match(&stored.email.subject)),
        "Expected a delivered email with subject matching /{}/.\n\nOutbox:\n{}",
        pattern,
        summary(&emails)
    );
}

/// Assert that the most recent delivery has an alternative of `mimetype`
/// whose content contains `needle`.
///
/// # Panics
///
/// Panics if the outbox is empty or no such alternative exists.
pub fn assert_last_alternative_contains(mailer: &LocalMailer, mimetype: &str, needle: &str) {
    let last = mailer
        .last_email()
        .unwrap_or_else(|| panic!("Expected a delivered email, but the outbox is empty"));
    let found = last
        .email
        .alternatives
        .iter()
        .any(|(content, mt)| mt == mimetype && content.contains(needle));
    assert!(
        found,
        "Expected the last email to carry a {} alternative containing '{}', got {:?}",
        mimetype,
        needle,
        last.email.alternatives
    );
}

/// # Panics
///
/// Panics unless exactly `expected` tasks are waiting in `queue`.
pub fn assert_tasks_queued(queue: &InMemoryQueue, expected: usize) {
    let pending = queue.pending();
    assert!(
        pending.len() == expected,
        "Expected {} queued task(s), found {}: {:?}",
        expected,
        pending.len(),
        pending.iter().map(|job| &job.handle.id).collect::<Vec<_>>()
    );
}

/// Message counts of the waiting tasks, oldest first.
///
/// # Panics
///
/// Panics if a queued body is not a valid payload.
pub fn queued_chunk_sizes(queue: &InMemoryQueue) -> Vec<usize> {
    queue
        .pending()
        .iter()
        .map(|job| match job.payload() {
            Ok(payload) => payload.messages.len(),
            Err(e) => panic!("Queued task {} has an invalid payload: {}", job.handle.id, e),
        })
        .collect()
}

/// # Panics
///
/// Panics unless exactly `expected` jobs were dead-lettered.
pub fn assert_dead_letters(queue: &InMemoryQueue, expected: usize) {
    let dead = queue.dead_letters();
    assert!(
        dead.len() == expected,
        "Expected {} dead-lettered task(s), found {}: {:?}",
        expected,
        dead.len(),
        dead.iter().map(|d| d.reason.to_string()).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::Mailer;
    use crate::Email;

    fn email(to: &str, subject: &str) -> Email {
        Email::new()
            .from("from@example.com")
            .to(to)
            .subject(subject)
    }

    #[tokio::test]
    async fn test_outbox_assertions() {
        let mailer = LocalMailer::new();
        assert_no_emails_sent(&mailer);

        mailer.deliver(&email("Ann@Example.com", "Invoice #42")).await.unwrap();
        mailer
            .deliver(&email("bob@example.com", "Report").html_body("<b>totals</b>"))
            .await
            .unwrap();

        assert_email_count(&mailer, 2);
        assert_email_to(&mailer, "ann@example.com");
        assert_email_subject_matches(&mailer, r"^Invoice #\d+$");
        assert_last_alternative_contains(&mailer, "text/html", "totals");
        assert_eq!(outbox_subjects(&mailer), ["Invoice #42", "Report"]);
    }

    #[tokio::test]
    #[should_panic(expected = "Expected 1 email(s)")]
    async fn test_count_mismatch_panics() {
        let mailer = LocalMailer::new();
        assert_email_count(&mailer, 1);
    }

    #[test]
    fn test_empty_queue() {
        let queue = InMemoryQueue::new();
        assert_tasks_queued(&queue, 0);
        assert!(queued_chunk_sizes(&queue).is_empty());
        assert_dead_letters(&queue, 0);
    }
}
