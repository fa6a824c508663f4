//! Submission backend tests.
//!
//! Check that batches become the right number of dispatch tasks, in order,
//! with translated backend parameters.

use std::sync::Arc;

use mail_dispatch::testing::{assert_tasks_queued, queued_chunk_sizes};
use mail_dispatch::{
    BackendParams, Config, DeliveryMode, Email, InMemoryQueue, MailError, SubmissionBackend,
    TaskOptions, DISPATCH_TASK_NAME,
};

fn messages(n: usize) -> Vec<Email> {
    (0..n)
        .map(|i| {
            Email::new()
                .from("from@example.com")
                .to(format!("user{}@example.com", i).as_str())
                .subject(format!("msg {}", i))
        })
        .collect()
}

fn submission(chunk_size: usize) -> (SubmissionBackend, Arc<InMemoryQueue>) {
    let queue = Arc::new(InMemoryQueue::new());
    let backend = SubmissionBackend::new(Config::new().chunk_size(chunk_size), queue.clone())
        .expect("valid config");
    (backend, queue)
}

// ============================================================================
// Chunking
// ============================================================================

#[tokio::test]
async fn eleven_messages_in_chunks_of_four() {
    let (backend, queue) = submission(4);

    let handles = backend
        .submit(&messages(11), &BackendParams::new())
        .await
        .unwrap();

    assert_eq!(handles.len(), 3);
    assert_eq!(queued_chunk_sizes(&queue), [4, 4, 3]);
}

#[tokio::test]
async fn exact_multiple_fills_every_chunk() {
    let (backend, queue) = submission(5);

    backend
        .submit(&messages(10), &BackendParams::new())
        .await
        .unwrap();

    assert_eq!(queued_chunk_sizes(&queue), [5, 5]);
}

#[tokio::test]
async fn default_chunk_size_is_ten() {
    let queue = Arc::new(InMemoryQueue::new());
    let backend = SubmissionBackend::new(Config::new(), queue.clone()).unwrap();

    backend
        .submit(&messages(25), &BackendParams::new())
        .await
        .unwrap();

    assert_eq!(queued_chunk_sizes(&queue), [10, 10, 5]);
}

#[tokio::test]
async fn chunks_preserve_batch_order() {
    let (backend, queue) = submission(3);

    let handles = backend
        .submit(&messages(7), &BackendParams::new())
        .await
        .unwrap();

    let pending = queue.pending();
    let subjects: Vec<String> = pending
        .iter()
        .flat_map(|job| job.payload().unwrap().messages)
        .map(|record| record.subject)
        .collect();
    let expected: Vec<String> = (0..7).map(|i| format!("msg {}", i)).collect();
    assert_eq!(subjects, expected);

    let ids: Vec<&str> = pending.iter().map(|job| job.handle.id.as_str()).collect();
    let handle_ids: Vec<&str> = handles.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, handle_ids);
}

#[tokio::test]
async fn empty_batch_submits_nothing() {
    let (backend, queue) = submission(4);

    let handles = backend.submit(&[], &BackendParams::new()).await.unwrap();

    assert!(handles.is_empty());
    assert_tasks_queued(&queue, 0);
}

#[test]
fn zero_chunk_size_is_a_configuration_error() {
    let queue = Arc::new(InMemoryQueue::new());
    let result = SubmissionBackend::new(Config::new().chunk_size(0), queue);
    assert!(matches!(result, Err(MailError::Configuration(_))));
}

// ============================================================================
// Backend parameters
// ============================================================================

#[tokio::test]
async fn auth_options_are_renamed_for_every_chunk() {
    let (backend, queue) = submission(2);
    let options = BackendParams::new()
        .with("auth_user", "user")
        .with("auth_password", "pass");

    backend.submit(&messages(5), &options).await.unwrap();

    let expected = BackendParams::new()
        .with("username", "user")
        .with("password", "pass");
    let pending = queue.pending();
    assert_eq!(pending.len(), 3);
    for job in pending {
        assert_eq!(job.payload().unwrap().backend_params, expected);
    }
}

#[tokio::test]
async fn unknown_options_follow_pass_through_setting() {
    let options = BackendParams::new().with("auth_user", "user").with("fail_silently", false);

    let queue = Arc::new(InMemoryQueue::new());
    let dropping = SubmissionBackend::new(Config::new().pass_through_options(false), queue.clone())
        .unwrap();
    dropping.submit(&messages(1), &options).await.unwrap();

    let params = queue.pop().unwrap().payload().unwrap().backend_params;
    assert_eq!(params, BackendParams::new().with("username", "user"));

    let (passing, queue) = submission(10);
    passing.submit(&messages(1), &options).await.unwrap();

    let params = queue.pop().unwrap().payload().unwrap().backend_params;
    assert_eq!(params.get_bool("fail_silently").unwrap(), Some(false));
}

// ============================================================================
// Task registration
// ============================================================================

#[tokio::test]
async fn tasks_carry_registration_options() {
    let (backend, queue) = submission(10);

    backend
        .submit(&messages(1), &BackendParams::new())
        .await
        .unwrap();

    let job = queue.pop().unwrap();
    assert_eq!(job.signature.name, DISPATCH_TASK_NAME);
    assert_eq!(job.signature.options.queue, "mail_dispatch");
    assert_eq!(job.signature.options.delivery_mode, DeliveryMode::Transient);
    assert_eq!(job.signature.options.delivery_mode.code(), 1);
    assert_eq!(job.signature.options.rate_limit.as_deref(), Some("50/m"));
    assert_eq!(job.handle.queue, "mail_dispatch");
}

#[tokio::test]
async fn custom_task_options_are_used() {
    let queue = Arc::new(InMemoryQueue::new());
    let options = TaskOptions {
        queue: "bulk".into(),
        delivery_mode: DeliveryMode::Persistent,
        rate_limit: None,
        ..Default::default()
    };
    let backend =
        SubmissionBackend::new(Config::new().task_options(options.clone()), queue.clone()).unwrap();

    backend
        .submit(&messages(1), &BackendParams::new())
        .await
        .unwrap();

    let job = queue.pop().unwrap();
    assert_eq!(job.signature.options, options);
    assert_eq!(job.handle.queue, "bulk");
}
