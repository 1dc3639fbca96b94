//! Deferred deletion executed by the dispatcher's sweep.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use stride::config::SchedulerConfig;
use stride::hierarchy::NewGoal;
use stride::scheduler::{ActionKind, DeletionStatus, ReservationLedger};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer};

use crate::helpers::{
    add_subject, podgorica_morning, send_path, sent_ok, telegram_dispatcher, temp_store,
    two_subgoal_breakdown,
};

#[tokio::test]
async fn past_due_request_removes_the_subject_and_is_not_repeated() {
    let server = MockServer::start().await;
    Mock::given(path(send_path()))
        .respond_with(sent_ok(1))
        .mount(&server)
        .await;

    let (store, _dir, _path) = temp_store();
    add_subject(&store, "leaving", "Europe/Podgorica", "111");
    add_subject(&store, "staying", "Europe/Podgorica", "222");
    for subject in ["leaving", "staying"] {
        store
            .create_goal(subject, &NewGoal::titled("g"), Some(&two_subgoal_breakdown()))
            .unwrap();
    }

    // Earn a reservation so the sweep has ledger rows to remove.
    let dispatcher = telegram_dispatcher(Arc::clone(&store), &server.uri(), &SchedulerConfig::default());
    dispatcher.tick_at(podgorica_morning()).await.unwrap();

    let request = store
        .request_deletion("leaving", podgorica_morning().timestamp() + 3600)
        .unwrap();

    // Not yet due.
    let before = dispatcher
        .tick_at(Utc.with_ymd_and_hms(2026, 1, 15, 7, 30, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(before.deletions_executed, 0);
    assert!(store.subject("leaving").unwrap().is_some());

    let due_at = Utc.with_ymd_and_hms(2026, 1, 15, 8, 1, 0).unwrap();
    let report = dispatcher.tick_at(due_at).await.unwrap();
    assert_eq!(report.deletions_executed, 1);

    assert!(store.subject("leaving").unwrap().is_none());
    assert!(store.goals_for_user("leaving").unwrap().is_empty());
    assert_eq!(store.goals_for_user("staying").unwrap().len(), 1);
    let ledger = ReservationLedger::new(Arc::clone(&store));
    assert!(!ledger
        .is_reserved(ActionKind::DailyReminder, "leaving", "2026-01-15")
        .unwrap());
    assert!(ledger
        .is_reserved(ActionKind::DailyReminder, "staying", "2026-01-15")
        .unwrap());

    let executed = store.deletion_request(&request.id).unwrap().unwrap();
    assert_eq!(executed.status, DeletionStatus::Done);
    assert_eq!(executed.executed_at, Some(due_at.timestamp()));

    let second = dispatcher.tick_at(due_at).await.unwrap();
    assert_eq!(second.deletions_executed, 0);
    assert!(store.due_deletions(due_at.timestamp()).unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_request_survives_the_sweep() {
    let server = MockServer::start().await;
    let (store, _dir, _path) = temp_store();
    add_subject(&store, "u1", "UTC", "111");
    store.create_goal("u1", &NewGoal::titled("g"), None).unwrap();

    store.request_deletion("u1", 0).unwrap();
    assert!(store.cancel_deletion("u1").unwrap());

    let report = telegram_dispatcher(Arc::clone(&store), &server.uri(), &SchedulerConfig::default())
        .tick_at(Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(report.deletions_executed, 0);
    assert!(store.subject("u1").unwrap().is_some());
    assert_eq!(store.goals_for_user("u1").unwrap().len(), 1);
}
