//! Shared helpers for integration tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use stride::channels::{ResilientChannel, RetryPolicy, TelegramChannel};
use stride::config::SchedulerConfig;
use stride::hierarchy::{Breakdown, SubgoalDraft, TaskDraft};
use stride::scheduler::{Dispatcher, TemplateContent};
use stride::store::{Store, Subject};
use wiremock::ResponseTemplate;

/// Bot token used against the mock API.
pub(crate) const TOKEN: &str = "123:TEST";

/// On-disk store in a fresh temp dir. Returns `(store, tempdir, db_path)`.
pub(crate) fn temp_store() -> (Arc<Store>, tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("stride.db");
    let store = Store::open(&path).expect("open store");
    (Arc::new(store), dir, path)
}

pub(crate) fn add_subject(store: &Store, id: &str, timezone: &str, address: &str) {
    let mut subject = Subject::new(id, format!("User {id}"));
    subject.timezone = Some(timezone.to_owned());
    subject.channel_address = Some(address.to_owned());
    store.upsert_subject(&subject).expect("upsert subject");
}

/// `[S1(T1[m1, m2]), S2(T2[m3])]`
pub(crate) fn two_subgoal_breakdown() -> Breakdown {
    Breakdown {
        subgoals: vec![
            SubgoalDraft {
                title: "S1".to_owned(),
                tasks: vec![TaskDraft {
                    title: "T1".to_owned(),
                    microtasks: vec!["m1".to_owned(), "m2".to_owned()],
                }],
            },
            SubgoalDraft {
                title: "S2".to_owned(),
                tasks: vec![TaskDraft {
                    title: "T2".to_owned(),
                    microtasks: vec!["m3".to_owned()],
                }],
            },
        ],
    }
}

/// Dispatcher talking to a mock Bot API, with fast retries.
pub(crate) fn telegram_dispatcher(
    store: Arc<Store>,
    api_base: &str,
    config: &SchedulerConfig,
) -> Dispatcher {
    let telegram =
        TelegramChannel::new(api_base, TOKEN, Duration::from_secs(5)).expect("telegram channel");
    let policy = RetryPolicy {
        max_attempts: 4,
        backoff_unit: Duration::from_millis(10),
        rate_limit_margin: Duration::ZERO,
    };
    Dispatcher::new(
        store,
        ResilientChannel::new(Arc::new(telegram), policy),
        Arc::new(TemplateContent),
        config,
    )
}

pub(crate) fn send_path() -> String {
    format!("/bot{TOKEN}/sendMessage")
}

pub(crate) fn sent_ok(message_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "ok": true,
        "result": { "message_id": message_id }
    }))
}

/// 08:00 in Europe/Podgorica (UTC+1) on Thursday 2026-01-15.
pub(crate) fn podgorica_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap()
}
