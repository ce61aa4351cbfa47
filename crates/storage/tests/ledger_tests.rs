//! Integration tests for ImportLedger backed by SQLite.

use std::sync::Arc;

use storage::{DayState, ImportLedger, ImportStatus, SqliteStore};
use test_utils::dates::{days_ago, today};

use agweather_common::DateRange;

async fn ledger() -> ImportLedger {
    let store = SqliteStore::open_memory().await.unwrap();
    ImportLedger::new(Arc::new(store))
}

// ============================================================================
// State transitions
// ============================================================================

#[tokio::test]
async fn test_transitions_overwrite_single_record() {
    let ledger = ledger().await;
    let date = days_ago(1);

    ledger.start("weather", date).await.unwrap();
    assert_eq!(
        ledger.status("weather", date).await.unwrap().unwrap().status,
        ImportStatus::Started
    );

    ledger.fail("weather", date, "incomplete coverage").await.unwrap();
    let record = ledger.status("weather", date).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Unsuccessful);
    assert_eq!(record.message.as_deref(), Some("incomplete coverage"));

    ledger.start("weather", date).await.unwrap();
    ledger.succeed("weather", date).await.unwrap();
    let record = ledger.status("weather", date).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Successful);
    assert_eq!(record.message, None);
}

#[tokio::test]
async fn test_status_of_unknown_date_is_none() {
    let ledger = ledger().await;
    assert!(ledger.status("weather", days_ago(1)).await.unwrap().is_none());
}

// ============================================================================
// Backfill planning
// ============================================================================

#[tokio::test]
async fn test_days_to_load_excludes_successful() {
    let ledger = ledger().await;

    ledger.succeed("weather", days_ago(1)).await.unwrap();
    ledger.fail("weather", days_ago(2), "no data retrieved").await.unwrap();
    ledger.start("weather", days_ago(3)).await.unwrap();
    ledger.succeed("weather", days_ago(4)).await.unwrap();

    let days = ledger.days_to_load("weather", today(), 5).await.unwrap();
    assert_eq!(days, vec![days_ago(5), days_ago(3), days_ago(2)]);
}

#[tokio::test]
async fn test_days_to_load_is_per_source() {
    let ledger = ledger().await;
    ledger.succeed("insolation", days_ago(1)).await.unwrap();

    let days = ledger.days_to_load("weather", today(), 2).await.unwrap();
    assert_eq!(days, vec![days_ago(2), days_ago(1)]);
}

#[tokio::test]
async fn test_days_to_load_never_includes_today() {
    let ledger = ledger().await;
    let days = ledger.days_to_load("weather", today(), 5).await.unwrap();
    assert_eq!(days.len(), 5);
    assert!(!days.contains(&today()));
}

#[tokio::test]
async fn test_missing_dates_unions_dataset_gaps_and_backfill() {
    let ledger = ledger().await;
    for n in 1..=3 {
        ledger.succeed("dd_50_86", days_ago(n)).await.unwrap();
    }
    ledger.fail("dd_50_86", days_ago(2), "bad data").await.unwrap();

    let range = DateRange::new(days_ago(10), days_ago(8));
    let present = vec![days_ago(10), days_ago(8)];
    let missing = ledger
        .missing_dates("dd_50_86", range, &present, today(), 3)
        .await
        .unwrap();

    assert_eq!(missing, vec![days_ago(9), days_ago(2)]);
}

// ============================================================================
// Status report
// ============================================================================

#[tokio::test]
async fn test_check_statuses_classifies_days() {
    let ledger = ledger().await;

    ledger.succeed("weather", days_ago(3)).await.unwrap();
    ledger.succeed("insolation", days_ago(3)).await.unwrap();
    ledger.succeed("weather", days_ago(2)).await.unwrap();
    ledger.start("insolation", days_ago(2)).await.unwrap();

    let report = ledger
        .check_statuses(DateRange::new(days_ago(3), days_ago(1)))
        .await
        .unwrap();

    assert_eq!(report.days.len(), 3);
    assert_eq!(report.days[0].state, DayState::Ok);
    assert_eq!(report.days[2].state, DayState::NotAttempted);

    match &report.days[1].state {
        DayState::Problem(problems) => {
            assert_eq!(problems.len(), 1);
            assert_eq!(problems[0].source, "insolation");
            assert_eq!(problems[0].status, ImportStatus::Started);
        }
        other => panic!("expected a problem, got {:?}", other),
    }

    assert!(report.has_problems());
    let rendered = report.to_string();
    assert!(rendered.contains("PROBLEM"));
    assert!(rendered.contains("  insolation: started"));
    assert!(rendered.contains("not attempted"));
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let ledger = ledger().await;
    ledger.fail("weather", days_ago(1), "no data retrieved").await.unwrap();

    let report = ledger
        .check_statuses(DateRange::new(days_ago(1), days_ago(1)))
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["days"][0]["state"]["state"], "problem");
    assert_eq!(
        json["days"][0]["state"]["problems"][0]["message"],
        "no data retrieved"
    );
}
