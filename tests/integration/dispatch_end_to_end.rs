//! Dispatcher against a mock Telegram Bot API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use stride::config::SchedulerConfig;
use stride::hierarchy::NewGoal;
use stride::scheduler::{ActionKind, DeliveryOutcome, ReservationLedger};
use stride::store::Store;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    add_subject, podgorica_morning, send_path, sent_ok, telegram_dispatcher, temp_store,
    two_subgoal_breakdown,
};

#[tokio::test]
async fn morning_nudge_is_sent_once_across_restarts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .and(body_partial_json(serde_json::json!({ "chat_id": "555" })))
        .respond_with(sent_ok(9001))
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir, _path) = temp_store();
    add_subject(&store, "u1", "Europe/Podgorica", "555");
    store
        .create_goal("u1", &NewGoal::titled("Run a marathon"), Some(&two_subgoal_breakdown()))
        .unwrap();

    let config = SchedulerConfig::default();
    let report = telegram_dispatcher(Arc::clone(&store), &server.uri(), &config)
        .tick_at(podgorica_morning())
        .await
        .unwrap();
    assert_eq!(report.action("daily_reminder").unwrap().delivered, 1);

    // Restarted process, same minute.
    let report = telegram_dispatcher(Arc::clone(&store), &server.uri(), &config)
        .tick_at(podgorica_morning())
        .await
        .unwrap();
    assert_eq!(report.action("daily_reminder").unwrap().duplicate, 1);

    let history = ReservationLedger::new(Arc::clone(&store))
        .deliveries_for("u1")
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message_id.as_deref(), Some("9001"));
}

#[tokio::test]
async fn concurrent_processes_race_for_one_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .respond_with(sent_ok(1))
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir, db_path) = temp_store();
    add_subject(&store, "u1", "Europe/Podgorica", "555");
    store.create_goal("u1", &NewGoal::titled("g"), None).unwrap();

    let config = SchedulerConfig::default();
    let a = telegram_dispatcher(Arc::new(Store::open(&db_path).unwrap()), &server.uri(), &config);
    let b = telegram_dispatcher(Arc::new(Store::open(&db_path).unwrap()), &server.uri(), &config);

    let (ra, rb) = tokio::join!(a.tick_at(podgorica_morning()), b.tick_at(podgorica_morning()));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    let delivered = ra.action("daily_reminder").unwrap().delivered
        + rb.action("daily_reminder").unwrap().delivered;
    let duplicate = ra.action("daily_reminder").unwrap().duplicate
        + rb.action("daily_reminder").unwrap().duplicate;
    assert_eq!((delivered, duplicate), (1, 1));
}

#[tokio::test]
async fn rate_limited_send_waits_for_the_hint_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 1",
            "parameters": { "retry_after": 1 }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .respond_with(sent_ok(77))
        .mount(&server)
        .await;

    let (store, _dir, _path) = temp_store();
    add_subject(&store, "u1", "Europe/Podgorica", "555");
    store.create_goal("u1", &NewGoal::titled("g"), None).unwrap();

    let started = Instant::now();
    let report = telegram_dispatcher(Arc::clone(&store), &server.uri(), &SchedulerConfig::default())
        .tick_at(podgorica_morning())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(report.action("daily_reminder").unwrap().delivered, 1);

    let history = ReservationLedger::new(Arc::clone(&store))
        .deliveries_for("u1")
        .unwrap();
    assert_eq!(history[0].attempts, 2);
    assert_eq!(history[0].outcome, DeliveryOutcome::Delivered);
}

#[tokio::test]
async fn blocked_bot_is_an_accepted_loss_for_the_day() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir, _path) = temp_store();
    add_subject(&store, "u1", "Europe/Podgorica", "555");
    store.create_goal("u1", &NewGoal::titled("g"), None).unwrap();

    let config = SchedulerConfig::default();
    let dispatcher = telegram_dispatcher(Arc::clone(&store), &server.uri(), &config);
    let report = dispatcher.tick_at(podgorica_morning()).await.unwrap();
    assert_eq!(report.action("daily_reminder").unwrap().failed, 1);

    let again = dispatcher.tick_at(podgorica_morning()).await.unwrap();
    assert_eq!(again.action("daily_reminder").unwrap().duplicate, 1);

    let ledger = ReservationLedger::new(Arc::clone(&store));
    assert!(ledger
        .is_reserved(ActionKind::DailyReminder, "u1", "2026-01-15")
        .unwrap());
    let history = ledger.deliveries_for("u1").unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].error.as_deref().unwrap().contains("blocked"));
}

#[tokio::test]
async fn configured_window_is_honoured_per_timezone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(send_path()))
        .and(body_partial_json(serde_json::json!({ "chat_id": "-100777" })))
        .respond_with(sent_ok(5))
        .expect(1)
        .mount(&server)
        .await;

    let (store, _dir, _path) = temp_store();
    add_subject(&store, "tokyo", "Asia/Tokyo", "-100777");
    add_subject(&store, "bogus_tz", "Not/AZone", "-100888");
    store.create_goal("tokyo", &NewGoal::titled("g"), None).unwrap();
    store.create_goal("bogus_tz", &NewGoal::titled("g"), None).unwrap();

    let config: SchedulerConfig = toml::from_str(
        r#"
        [daily_reminder]
        hour = 21
        minute = 30

        [weekly_checkin]
        enabled = false
        "#,
    )
    .unwrap();

    // 21:30 in Tokyo (UTC+9) is 12:30 UTC; the invalid zone reads as UTC.
    let report = telegram_dispatcher(Arc::clone(&store), &server.uri(), &config)
        .tick_at(Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap())
        .await
        .unwrap();
    assert!(report.action("weekly_checkin").is_none());
    let daily = report.action("daily_reminder").unwrap();
    assert_eq!((daily.eligible, daily.delivered), (1, 1));
}
