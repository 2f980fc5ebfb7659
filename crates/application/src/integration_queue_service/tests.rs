use std::sync::Arc;
use std::time::Duration;

use procura_core::AppError;
use procura_domain::{NewIntegrationRecord, RecordStatus, Transport};
use serde_json::json;

use crate::integration_ports::{HealthStatus, SubmitEventInput};
use crate::test_support::{FakeAuditRepository, FakeDispatcher, QueueHarness};

fn event(kind: &str) -> NewIntegrationRecord {
    NewIntegrationRecord {
        kind: kind.to_owned(),
        source: "ui".to_owned(),
        payload: json!({"title": "Paper A4", "qty": 10}),
        transport: Transport::TargetWebhook,
    }
}

#[tokio::test]
async fn flush_without_target_keeps_record_queued() {
    let harness = QueueHarness::new(FakeDispatcher::without_target(), 5);
    let enqueued = harness.service.enqueue(event("procurement.draft")).await;
    assert!(enqueued.is_ok());

    let result = harness.service.flush(100).await;
    let Ok(result) = result else {
        panic!("flush should succeed");
    };

    assert_eq!(result.processed, 1);
    assert_eq!(result.success, 0);
    assert_eq!(result.failed, 1);
    assert_eq!(result.dead_lettered, 0);
    assert_eq!(result.queue_remaining, 1);
    assert!(!result.target_configured);

    let state = harness.store.snapshot().await;
    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue[0].attempts(), 1);
    assert_eq!(
        state.queue[0].last_result(),
        Some("target_webhook_not_configured")
    );
}

#[tokio::test]
async fn record_dead_letters_after_max_attempts() {
    let harness = QueueHarness::new(FakeDispatcher::unreachable(), 2);
    assert!(harness.service.enqueue(event("procurement.draft")).await.is_ok());

    let first = harness.service.flush(10).await;
    assert!(first.is_ok_and(|result| result.dead_lettered == 0 && result.queue_remaining == 1));

    let second = harness.service.flush(10).await;
    let Ok(second) = second else {
        panic!("second flush should succeed");
    };
    assert_eq!(second.dead_lettered, 1);
    assert_eq!(second.queue_remaining, 0);

    let state = harness.store.snapshot().await;
    assert!(state.queue.is_empty());
    assert!(state.history.is_empty());
    assert_eq!(state.dead_letter.len(), 1);
    assert_eq!(state.dead_letter[0].attempts(), 2);
    assert_eq!(state.dead_letter[0].status(), RecordStatus::DeadLetter);
    assert!(state.dead_letter[0].dead_letter_at().is_some());

    let third = harness.service.flush(10).await;
    assert!(third.is_ok_and(|result| result.processed == 0));
}

#[tokio::test]
async fn delivered_records_move_to_history_once() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    for kind in ["event.one", "event.two"] {
        assert!(harness.service.enqueue(event(kind)).await.is_ok());
    }

    let result = harness.service.flush(10).await;
    assert!(result.is_ok_and(|result| result.success == 2 && result.queue_remaining == 0));

    let state = harness.store.snapshot().await;
    assert!(state.queue.is_empty());
    assert_eq!(state.history.len(), 2);
    assert!(
        state
            .history
            .iter()
            .all(|record| record.status() == RecordStatus::Sent && record.attempts() == 1)
    );
}

#[tokio::test]
async fn flush_respects_limit_and_order() {
    let harness = QueueHarness::new(FakeDispatcher::unreachable(), 5);
    let mut ids = Vec::new();
    for kind in ["event.a", "event.b", "event.c"] {
        let Ok(record) = harness.service.enqueue(event(kind)).await else {
            panic!("enqueue should succeed");
        };
        ids.push(record.id());
    }

    let result = harness.service.flush(2).await;
    assert!(result.is_ok_and(|result| result.processed == 2));
    assert_eq!(harness.dispatcher.dispatched().await, ids[..2].to_vec());

    let state = harness.store.snapshot().await;
    let order: Vec<_> = state.queue.iter().map(|record| record.id()).collect();
    assert_eq!(order, ids);
    let attempts: Vec<_> = state.queue.iter().map(|record| record.attempts()).collect();
    assert_eq!(attempts, vec![1, 1, 0]);
}

#[tokio::test]
async fn flush_persists_once_per_batch() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    for kind in ["event.a", "event.b", "event.c"] {
        assert!(harness.service.enqueue(event(kind)).await.is_ok());
    }
    let saves_before = harness.store.save_count();

    assert!(harness.service.flush(10).await.is_ok());
    assert_eq!(harness.store.save_count(), saves_before + 1);
}

#[tokio::test]
async fn flush_rejects_out_of_range_limit() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    assert!(matches!(
        harness.service.flush(0).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        harness.service.flush(501).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn failed_commit_surfaces_and_keeps_records_queued() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    assert!(harness.service.enqueue(event("event.a")).await.is_ok());

    harness.store.fail_saves(true);
    assert!(matches!(
        harness.service.flush(10).await,
        Err(AppError::Internal(_))
    ));

    harness.store.fail_saves(false);
    let state = harness.store.snapshot().await;
    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue[0].attempts(), 0);

    let retry = harness.service.flush(10).await;
    assert!(retry.is_ok_and(|result| result.success == 1));
}

#[tokio::test]
async fn concurrent_flushes_attempt_each_record_once() {
    let harness = QueueHarness::new(
        FakeDispatcher::unreachable().with_delay(Duration::from_millis(20)),
        5,
    );
    for kind in ["event.a", "event.b", "event.c", "event.d"] {
        assert!(harness.service.enqueue(event(kind)).await.is_ok());
    }

    let (left, right) = tokio::join!(harness.service.flush(10), harness.service.flush(10));
    let (Ok(left), Ok(right)) = (left, right) else {
        panic!("both flushes should succeed");
    };
    assert_eq!(left.processed + right.processed, 4);

    let state = harness.store.snapshot().await;
    assert_eq!(state.queue.len(), 4);
    assert!(state.queue.iter().all(|record| record.attempts() == 1));
}

#[tokio::test]
async fn enqueue_during_flush_is_not_lost() {
    let harness = Arc::new(QueueHarness::new(
        FakeDispatcher::delivering().with_delay(Duration::from_millis(30)),
        5,
    ));
    assert!(harness.service.enqueue(event("event.first")).await.is_ok());

    let flushing = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.service.flush(10).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let late = harness.service.enqueue(event("event.late")).await;
    let Ok(late) = late else {
        panic!("enqueue should succeed");
    };

    let flushed = flushing.await;
    assert!(matches!(flushed, Ok(Ok(result)) if result.success == 1));

    let state = harness.store.snapshot().await;
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue[0].id(), late.id());
}

#[tokio::test]
async fn flush_writes_item_and_summary_audit_entries() {
    let harness = QueueHarness::new(FakeDispatcher::unreachable(), 1);
    assert!(harness.service.enqueue(event("event.a")).await.is_ok());
    assert!(harness.service.flush(10).await.is_ok());

    let actions = harness.audit.actions().await;
    assert_eq!(
        actions,
        vec![
            ("queue.append".to_owned(), "ok".to_owned()),
            ("queue.flush_item".to_owned(), "dead_letter".to_owned()),
            ("queue.flush".to_owned(), "ok".to_owned()),
        ]
    );

    let recent = harness.service.read_audit(0).await;
    assert!(recent.is_ok_and(|entries| entries.len() == 1 && entries[0].action == "queue.flush"));
}

#[tokio::test]
async fn audit_failures_do_not_fail_operations() {
    let harness = QueueHarness::with_audit(
        FakeDispatcher::delivering(),
        5,
        FakeAuditRepository::failing(),
    );
    assert!(harness.service.enqueue(event("event.a")).await.is_ok());
    assert!(harness.service.flush(10).await.is_ok());

    let health = harness.service.health_snapshot().await;
    assert!(health.is_ok_and(|health| health.audit_write_failures == 3));
}

#[tokio::test]
async fn submit_event_replays_cached_receipt() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    let input = SubmitEventInput {
        kind: "procurement.published".to_owned(),
        source: "ui".to_owned(),
        payload: json!({"procedure_id": "P-7"}),
        idempotency_key: Some("publish-P-7".to_owned()),
    };

    let first = harness.service.submit_event(input.clone()).await;
    let second = harness.service.submit_event(input).await;
    let (Ok(first), Ok(second)) = (first, second) else {
        panic!("submissions should succeed");
    };

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.record_id, second.record_id);
    assert_eq!(harness.store.snapshot().await.queue.len(), 1);
    assert!(
        harness
            .audit
            .actions()
            .await
            .contains(&("event.idempotency_hit".to_owned(), "ok".to_owned()))
    );
}

#[tokio::test]
async fn concurrent_duplicate_submissions_create_one_record() {
    let harness = Arc::new(QueueHarness::new(FakeDispatcher::delivering(), 5));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            harness
                .service
                .submit_event(SubmitEventInput {
                    kind: "procurement.published".to_owned(),
                    source: "ui".to_owned(),
                    payload: json!({}),
                    idempotency_key: Some("same-key".to_owned()),
                })
                .await
        }));
    }

    let mut record_ids = Vec::new();
    for handle in handles {
        let Ok(Ok(receipt)) = handle.await else {
            panic!("submission should succeed");
        };
        record_ids.push(receipt.record_id);
    }
    record_ids.dedup();

    assert_eq!(record_ids.len(), 1);
    assert_eq!(harness.store.snapshot().await.queue.len(), 1);
}

#[tokio::test]
async fn submit_event_rejects_invalid_input() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    let short_kind = harness
        .service
        .submit_event(SubmitEventInput {
            kind: "ab".to_owned(),
            source: "ui".to_owned(),
            payload: json!({}),
            idempotency_key: None,
        })
        .await;
    assert!(matches!(short_kind, Err(AppError::Validation(_))));

    let long_key = harness
        .service
        .submit_event(SubmitEventInput {
            kind: "procurement.published".to_owned(),
            source: "ui".to_owned(),
            payload: json!({}),
            idempotency_key: Some("k".repeat(200)),
        })
        .await;
    assert!(matches!(long_key, Err(AppError::Validation(_))));
    assert!(harness.store.snapshot().await.queue.is_empty());
}

#[tokio::test]
async fn submit_draft_uses_connector_endpoint() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    let receipt = harness
        .service
        .submit_draft(json!({
            "title": "Office chairs",
            "connector_endpoint": "https://connector.example.test/drafts",
            "connector_token": "secret",
            "connector_headers": {"X-Tenant": "north", "X-Version": 2},
        }))
        .await;
    assert!(receipt.is_ok_and(|receipt| receipt.status == RecordStatus::Queued));

    let state = harness.store.snapshot().await;
    let record = &state.queue[0];
    assert_eq!(record.kind(), "procurement.draft");
    assert_eq!(record.source(), "platform_connector");
    assert_eq!(record.payload(), &json!({"title": "Office chairs"}));

    let Transport::Endpoint { url, token, headers } = record.transport() else {
        panic!("draft should use endpoint transport");
    };
    assert_eq!(url, "https://connector.example.test/drafts");
    assert_eq!(token, "secret");
    assert_eq!(headers.get("X-Version").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn submit_draft_rejects_non_object_payload_and_bad_endpoint() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    assert!(matches!(
        harness.service.submit_draft(json!(["not", "an", "object"])).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        harness
            .service
            .submit_draft(json!({"connector_endpoint": "ftp://files.example.test"}))
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn health_degrades_with_dead_letters() {
    let harness = QueueHarness::new(FakeDispatcher::unreachable(), 1);
    let healthy = harness.service.health_snapshot().await;
    assert!(healthy.is_ok_and(|health| health.status == HealthStatus::Ok));

    assert!(harness.service.enqueue(event("event.a")).await.is_ok());
    assert!(harness.service.enqueue(event("event.b")).await.is_ok());
    assert!(harness.service.flush(1).await.is_ok());

    let Ok(health) = harness.service.health_snapshot().await else {
        panic!("health should load");
    };
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.dead_letter_total, 1);
    assert_eq!(health.queue_total, 1);
    assert_eq!(health.max_attempts, 1);
    assert_eq!(health.flush_24h_counts.dead_lettered, 1);
    assert_eq!(health.flush_24h_counts.sent, 0);
}

#[tokio::test]
async fn overview_lists_latest_first() {
    let harness = QueueHarness::new(FakeDispatcher::delivering(), 5);
    for kind in ["event.a", "event.b", "event.c"] {
        assert!(harness.service.enqueue(event(kind)).await.is_ok());
    }

    let Ok(overview) = harness.service.queue_overview(Some(2)).await else {
        panic!("overview should load");
    };
    assert_eq!(overview.queue_total, 3);
    let kinds: Vec<_> = overview.queue.iter().map(|record| record.kind()).collect();
    assert_eq!(kinds, vec!["event.c", "event.b"]);
    assert!(overview.target_configured);
}
