use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use super::*;
use crate::limits::*;
use crate::model::*;
use crate::query::QueryRequest;
use crate::service::CalendarService;
use crate::store::SlotStore;

const H: Ms = 3_600_000; // 1 hour in ms
const M: Ms = 60_000; // 1 minute in ms
const DAY: Ms = 1_714_694_400_000; // 2024-05-03T00:00:00Z

fn may_3() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn profile(languages: &[&str], products: &[&str], ratings: &[&str]) -> SkillProfile {
    SkillProfile {
        languages: set(languages),
        products: set(products),
        customer_ratings: set(ratings),
    }
}

fn criteria(products: &[&str], language: &str, rating: &str) -> Criteria {
    Criteria {
        products: set(products),
        language: language.into(),
        rating: rating.into(),
    }
}

fn request(products: &[&str], language: &str, rating: &str) -> QueryRequest {
    QueryRequest {
        date: "2024-05-03".into(),
        products: products.iter().map(|s| s.to_string()).collect(),
        language: language.into(),
        rating: rating.into(),
    }
}

fn as_map(slots: &[AvailableSlot]) -> HashMap<String, u32> {
    slots
        .iter()
        .map(|s| (s.start_timestamp.clone(), s.available_count))
        .collect()
}

// ── Async engine tests ───────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotfinder_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn engine_create_and_list_manager() {
    let path = test_wal_path("create_manager.wal");
    let engine = Engine::new(path).unwrap();

    engine
        .create_manager(1, Some("Seller 1".into()), profile(&["German"], &["SolarPanels"], &["Gold"]))
        .await
        .unwrap();

    let managers = engine.list_managers().await;
    assert_eq!(managers.len(), 1);
    assert_eq!(managers[0].name.as_deref(), Some("Seller 1"));
    assert_eq!(managers[0].slot_count, 0);
}

#[tokio::test]
async fn engine_duplicate_manager_rejected() {
    let path = test_wal_path("duplicate_manager.wal");
    let engine = Engine::new(path).unwrap();

    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    let result = engine.create_manager(1, None, SkillProfile::default()).await;
    assert!(matches!(result, Err(EngineError::ManagerExists(1))));
}

#[tokio::test]
async fn engine_delete_manager_with_slots_fails() {
    let path = test_wal_path("delete_with_slots.wal");
    let engine = Engine::new(path).unwrap();

    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(10, 1, DAY + 9 * H, DAY + 10 * H, false).await.unwrap();

    assert!(matches!(engine.delete_manager(1).await, Err(EngineError::HasSlots(1))));

    engine.remove_slot(10).await.unwrap();
    engine.delete_manager(1).await.unwrap();
    assert!(engine.list_managers().await.is_empty());
    assert!(matches!(engine.delete_manager(1).await, Err(EngineError::ManagerNotFound(1))));
}

#[tokio::test]
async fn engine_slot_requires_existing_manager() {
    let path = test_wal_path("slot_no_manager.wal");
    let engine = Engine::new(path).unwrap();

    let result = engine.add_slot(10, 99, DAY, DAY + H, false).await;
    assert!(matches!(result, Err(EngineError::ManagerNotFound(99))));
}

#[tokio::test]
async fn engine_duplicate_slot_rejected_across_managers() {
    let path = test_wal_path("duplicate_slot.wal");
    let engine = Engine::new(path).unwrap();

    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.create_manager(2, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(10, 1, DAY, DAY + H, false).await.unwrap();

    let result = engine.add_slot(10, 2, DAY + H, DAY + 2 * H, false).await;
    assert!(matches!(result, Err(EngineError::SlotExists(10))));
}

#[tokio::test]
async fn engine_rejects_bad_spans() {
    let path = test_wal_path("bad_spans.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();

    assert!(matches!(
        engine.add_slot(1, 1, DAY + H, DAY + H, false).await,
        Err(EngineError::InvalidSpan(_))
    ));
    assert!(matches!(
        engine.add_slot(2, 1, DAY + 2 * H, DAY + H, false).await,
        Err(EngineError::InvalidSpan(_))
    ));
    assert!(matches!(
        engine.add_slot(3, 1, DAY, DAY + MAX_SLOT_DURATION_MS + 1, false).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        engine.add_slot(4, 1, 0, H, false).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(engine.list_slots(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_profile_limits() {
    let path = test_wal_path("profile_limits.wal");
    let engine = Engine::new(path).unwrap();

    let long = "x".repeat(MAX_SKILL_LEN + 1);
    let result = engine
        .create_manager(1, None, profile(&[long.as_str()], &[], &[]))
        .await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));

    let long_name = "n".repeat(MAX_NAME_LEN + 1);
    let result = engine.create_manager(2, Some(long_name), SkillProfile::default()).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn engine_booking_toggle() {
    let path = test_wal_path("booking_toggle.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(10, 1, DAY + 9 * H, DAY + 10 * H, false).await.unwrap();

    assert_eq!(engine.set_slot_booked(10, true).await.unwrap(), 1);
    assert!(engine.list_slots(1).await.unwrap()[0].booked);
    engine.set_slot_booked(10, false).await.unwrap();
    assert!(!engine.list_slots(1).await.unwrap()[0].booked);

    assert!(matches!(
        engine.set_slot_booked(11, true).await,
        Err(EngineError::SlotNotFound(11))
    ));
}

#[tokio::test]
async fn engine_list_slots_sorted_by_start() {
    let path = test_wal_path("list_sorted.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(3, 1, DAY + 15 * H, DAY + 16 * H, false).await.unwrap();
    engine.add_slot(1, 1, DAY + 9 * H, DAY + 10 * H, true).await.unwrap();
    engine.add_slot(2, 1, DAY + 12 * H, DAY + 13 * H, false).await.unwrap();

    let ids: Vec<SlotId> = engine.list_slots(1).await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(matches!(engine.list_slots(2).await, Err(EngineError::ManagerNotFound(2))));
}

// ── Batch inserts ─────────────────────────────────────────────

#[tokio::test]
async fn batch_add_slots_across_managers() {
    let path = test_wal_path("batch_ok.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.create_manager(2, None, SkillProfile::default()).await.unwrap();

    engine
        .batch_add_slots(vec![
            (1, 1, DAY + 9 * H, DAY + 10 * H, false),
            (2, 2, DAY + 9 * H, DAY + 10 * H, true),
            (3, 1, DAY + 10 * H, DAY + 11 * H, false),
        ])
        .await
        .unwrap();

    assert_eq!(engine.list_slots(1).await.unwrap().len(), 2);
    assert_eq!(engine.list_slots(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_add_slots_is_all_or_nothing() {
    let path = test_wal_path("batch_atomic.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(5, 1, DAY, DAY + H, false).await.unwrap();

    // Duplicate of an existing slot.
    let result = engine
        .batch_add_slots(vec![
            (6, 1, DAY + H, DAY + 2 * H, false),
            (5, 1, DAY + 2 * H, DAY + 3 * H, false),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::SlotExists(5))));

    // Duplicate within the batch.
    let result = engine
        .batch_add_slots(vec![
            (7, 1, DAY + H, DAY + 2 * H, false),
            (7, 1, DAY + 2 * H, DAY + 3 * H, false),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::SlotExists(7))));

    // Unknown manager.
    let result = engine
        .batch_add_slots(vec![
            (8, 1, DAY + H, DAY + 2 * H, false),
            (9, 42, DAY + 2 * H, DAY + 3 * H, false),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::ManagerNotFound(42))));

    // Invalid span.
    let result = engine
        .batch_add_slots(vec![
            (10, 1, DAY + H, DAY + 2 * H, false),
            (11, 1, DAY + 3 * H, DAY + 2 * H, false),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::InvalidSpan(_))));

    let ids: Vec<SlotId> = engine.list_slots(1).await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_of_one_slot_id_admit_a_single_owner() {
    let path = test_wal_path("slot_id_race.wal");
    let engine = Arc::new(Engine::new(path.clone()).unwrap());
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.create_manager(2, None, SkillProfile::default()).await.unwrap();

    for round in 0..200i64 {
        let id = 10_000 + round;
        let start = DAY + round * H;
        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add_slot(id, 1, start, start + H, false).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.batch_add_slots(vec![(id, 2, start, start + H, false)]).await
            })
        };
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        assert!(
            ra.is_ok() != rb.is_ok(),
            "slot {id} accepted {} times",
            usize::from(ra.is_ok()) + usize::from(rb.is_ok())
        );
        let owner = if ra.is_ok() { 1 } else { 2 };
        assert_eq!(engine.get_manager_for_slot(&id), Some(owner));
    }

    let total = engine.list_slots(1).await.unwrap().len() + engine.list_slots(2).await.unwrap().len();
    assert_eq!(total, 200);
    drop(engine);

    let engine = Engine::new(path).unwrap();
    let total = engine.list_slots(1).await.unwrap().len() + engine.list_slots(2).await.unwrap().len();
    assert_eq!(total, 200);
}

#[tokio::test]
async fn failed_wal_write_leaves_no_slots_and_frees_ids() {
    let path = test_wal_path("wal_down.wal");
    let mut engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.create_manager(2, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(1, 1, DAY, DAY + H, false).await.unwrap();

    let (closed_tx, closed_rx) = tokio::sync::mpsc::channel(1);
    drop(closed_rx);
    engine.wal_tx = closed_tx;

    let result = engine
        .batch_add_slots(vec![
            (2, 1, DAY + H, DAY + 2 * H, false),
            (3, 2, DAY + H, DAY + 2 * H, false),
            (4, 2, DAY + 2 * H, DAY + 3 * H, true),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::WalError(_))));
    let result = engine.add_slot(5, 2, DAY + 4 * H, DAY + 5 * H, false).await;
    assert!(matches!(result, Err(EngineError::WalError(_))));

    assert_eq!(engine.list_slots(1).await.unwrap().len(), 1);
    assert!(engine.list_slots(2).await.unwrap().is_empty());
    for id in 2..=5 {
        assert_eq!(engine.get_manager_for_slot(&id), None, "slot {id} still reserved");
    }
}

#[tokio::test]
async fn batch_is_one_wal_unit() {
    let path = test_wal_path("batch_unit.wal");
    let engine = Engine::new(path.clone()).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine
        .batch_add_slots((0..10).map(|i| (i, 1, DAY + i * H, DAY + (i + 1) * H, i % 2 == 0)).collect())
        .await
        .unwrap();
    assert_eq!(engine.appends_since_compact().await.unwrap(), 11);
    drop(engine);

    let engine = Engine::new(path).unwrap();
    let slots = engine.list_slots(1).await.unwrap();
    assert_eq!(slots.len(), 10);
    assert_eq!(slots.iter().filter(|s| s.booked).count(), 5);
}

#[tokio::test]
async fn batch_too_large_rejected() {
    let path = test_wal_path("batch_large.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();

    let batch: Vec<NewSlot> = (0..MAX_BATCH_SIZE as i64 + 1)
        .map(|i| (i, 1, DAY + i * M, DAY + (i + 1) * M, false))
        .collect();
    assert!(matches!(
        engine.batch_add_slots(batch).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Reads ──────────────────────────────────────────────────────

#[tokio::test]
async fn matching_managers_applies_all_criteria() {
    let path = test_wal_path("matching.wal");
    let engine = Engine::new(path).unwrap();
    engine
        .create_manager(1, None, profile(&["German"], &["SolarPanels", "Heatpumps"], &["Gold"]))
        .await
        .unwrap();
    engine
        .create_manager(2, None, profile(&["German", "English"], &["SolarPanels"], &["Gold", "Silver"]))
        .await
        .unwrap();
    engine
        .create_manager(3, None, profile(&["English"], &["Heatpumps"], &["Bronze"]))
        .await
        .unwrap();

    let sorted = |mut v: Vec<ManagerId>| {
        v.sort_unstable();
        v
    };
    assert_eq!(
        sorted(engine.matching_managers(&criteria(&["SolarPanels"], "German", "Gold")).await),
        vec![1, 2]
    );
    assert_eq!(
        engine.matching_managers(&criteria(&["SolarPanels", "Heatpumps"], "German", "Gold")).await,
        vec![1]
    );
    assert_eq!(
        engine.matching_managers(&criteria(&["SolarPanels"], "English", "Silver")).await,
        vec![2]
    );
    assert!(engine.matching_managers(&criteria(&["SolarPanels"], "Swahili", "Gold")).await.is_empty());
}

#[tokio::test]
async fn slots_on_uses_utc_day_of_start() {
    let path = test_wal_path("slots_on_day.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    // Starts the evening before, runs into the day.
    engine.add_slot(1, 1, DAY - 30 * M, DAY + 30 * M, true).await.unwrap();
    engine.add_slot(2, 1, DAY, DAY + H, false).await.unwrap();
    engine.add_slot(3, 1, DAY + 23 * H + 30 * M, DAY + 24 * H + 30 * M, false).await.unwrap();
    // Midnight of the next day.
    engine.add_slot(4, 1, DAY + 24 * H, DAY + 25 * H, false).await.unwrap();

    let records = engine.slots_on(&[1], may_3()).await.unwrap();
    let starts: Vec<Ms> = records.iter().map(|r| r.start.timestamp_millis()).collect();
    assert_eq!(starts, vec![DAY, DAY + 23 * H + 30 * M]);
}

#[tokio::test]
async fn slots_on_skips_unknown_and_duplicate_ids() {
    let path = test_wal_path("slots_on_ids.wal");
    let engine = Engine::new(path).unwrap();
    engine.create_manager(1, None, SkillProfile::default()).await.unwrap();
    engine.add_slot(1, 1, DAY + 9 * H, DAY + 10 * H, false).await.unwrap();

    let records = engine.slots_on(&[1, 1, 77], may_3()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].manager_id, 1);
    assert!(!records[0].booked);
}

// ── Durability ────────────────────────────────────────────────

#[tokio::test]
async fn engine_wal_replay() {
    let path = test_wal_path("replay.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine
            .create_manager(1, Some("Seller 1".into()), profile(&["German"], &["SolarPanels"], &["Gold"]))
            .await
            .unwrap();
        engine.create_manager(2, None, SkillProfile::default()).await.unwrap();
        engine.add_slot(10, 1, DAY + 9 * H, DAY + 10 * H, false).await.unwrap();
        engine.add_slot(11, 1, DAY + 10 * H, DAY + 11 * H, false).await.unwrap();
        engine.set_slot_booked(10, true).await.unwrap();
        engine.remove_slot(11).await.unwrap();
        engine.delete_manager(2).await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    let managers = engine.list_managers().await;
    assert_eq!(managers.len(), 1);
    assert_eq!(managers[0].profile.products, set(&["SolarPanels"]));

    let slots = engine.list_slots(1).await.unwrap();
    assert_eq!(slots.len(), 1);
    assert!(slots[0].booked);
    // Reverse index rebuilt.
    assert_eq!(engine.get_manager_for_slot(&10), Some(1));
    assert_eq!(engine.get_manager_for_slot(&11), None);
}

#[tokio::test]
async fn engine_compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_manager(1, None, profile(&["German"], &["SolarPanels"], &["Gold"])).await.unwrap();
        for i in 0..10 {
            engine.add_slot(i, 1, DAY + i * H, DAY + (i + 1) * H, false).await.unwrap();
        }
        for i in 0..5 {
            engine.remove_slot(i).await.unwrap();
        }
        engine.set_slot_booked(7, true).await.unwrap();
        assert_eq!(engine.appends_since_compact().await.unwrap(), 17);

        let written = engine.compact().await.unwrap();
        assert_eq!(written, 6);
        assert_eq!(engine.appends_since_compact().await.unwrap(), 0);

        engine.add_slot(100, 1, DAY + 20 * H, DAY + 21 * H, false).await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    let slots = engine.list_slots(1).await.unwrap();
    let ids: Vec<SlotId> = slots.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![5, 6, 7, 8, 9, 100]);
    assert!(slots.iter().find(|s| s.id == 7).unwrap().booked);
}

#[tokio::test]
async fn concurrent_mutations_and_compaction() {
    let path = test_wal_path("concurrent_compaction.wal");
    let engine = Arc::new(Engine::new(path.clone()).unwrap());
    for m in 0..4 {
        engine.create_manager(m, None, SkillProfile::default()).await.unwrap();
    }

    let mut tasks = Vec::new();
    for m in 0..4i64 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50i64 {
                let id = m * 1000 + i;
                engine.add_slot(id, m, DAY + i * H, DAY + (i + 1) * H, i % 3 == 0).await.unwrap();
            }
        }));
    }
    let compactor = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                engine.compact().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    for t in tasks {
        t.await.unwrap();
    }
    compactor.await.unwrap();
    drop(engine);

    let engine = Engine::new(path).unwrap();
    for m in 0..4 {
        let slots = engine.list_slots(m).await.unwrap();
        assert_eq!(slots.len(), 50);
        assert_eq!(slots.iter().filter(|s| s.booked).count(), 17);
    }
}

// ── Availability over the engine ──────────────────────────────

async fn seeded_engine(name: &str) -> Arc<Engine> {
    let engine = Arc::new(Engine::new(test_wal_path(name)).unwrap());
    engine
        .create_manager(1, None, profile(&["German"], &["SolarPanels", "Heatpumps"], &["Gold"]))
        .await
        .unwrap();
    engine
        .create_manager(2, None, profile(&["German", "English"], &["SolarPanels"], &["Gold"]))
        .await
        .unwrap();
    engine
        .create_manager(7, None, profile(&["English"], &["Heatpumps"], &["Silver"]))
        .await
        .unwrap();
    engine
        .batch_add_slots(vec![
            (1, 1, DAY + 10 * H + 30 * M, DAY + 11 * H + 30 * M, false),
            (2, 2, DAY + 10 * H + 30 * M, DAY + 11 * H + 30 * M, false),
            (3, 2, DAY + 11 * H + 30 * M, DAY + 12 * H + 30 * M, false),
            (4, 1, DAY + 24 * H + 10 * H, DAY + 24 * H + 11 * H, false),
            (5, 7, DAY + 9 * H, DAY + 10 * H, false),
            (6, 7, DAY + 9 * H, DAY + 10 * H, true),
        ])
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn store_reads_through_trait() {
    let engine = seeded_engine("store_trait.wal").await;
    let store: Arc<dyn SlotStore> = engine;

    let mut ids = store.match_managers(&criteria(&["SolarPanels"], "German", "Gold")).await.unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    let records = store.load_slots(&ids, may_3()).await.unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn service_over_engine_aggregates() {
    let engine = seeded_engine("service_aggregate.wal").await;
    let service = CalendarService::new(engine);

    let out = service.available_slots(request(&["SolarPanels"], "German", "Gold")).await.unwrap();
    let map = as_map(&out);
    assert_eq!(map.len(), 2);
    assert_eq!(map["2024-05-03T10:30:00.000Z"], 2);
    assert_eq!(map["2024-05-03T11:30:00.000Z"], 1);
}

#[tokio::test]
async fn service_over_engine_booked_duplicate_is_empty() {
    let engine = seeded_engine("service_booked.wal").await;
    let service = CalendarService::new(engine);

    let out = service.available_slots(request(&["Heatpumps"], "English", "Silver")).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn booking_removes_capacity() {
    let engine = seeded_engine("service_booking.wal").await;
    let service = CalendarService::new(engine.clone());
    let q = request(&["SolarPanels"], "German", "Gold");

    engine.set_slot_booked(2, true).await.unwrap();
    let map = as_map(&service.available_slots(q.clone()).await.unwrap());
    assert_eq!(map["2024-05-03T10:30:00.000Z"], 1);
    // Manager 2's 11:30 slot only touches its 10:30 booking.
    assert_eq!(map["2024-05-03T11:30:00.000Z"], 1);

    engine.set_slot_booked(2, false).await.unwrap();
    let map = as_map(&service.available_slots(q).await.unwrap());
    assert_eq!(map["2024-05-03T10:30:00.000Z"], 2);
}

#[tokio::test]
async fn long_booking_blocks_overlapping_free_slots() {
    let engine = Arc::new(Engine::new(test_wal_path("long_booking.wal")).unwrap());
    engine
        .create_manager(1, None, profile(&["German"], &["SolarPanels"], &["Gold"]))
        .await
        .unwrap();
    engine
        .batch_add_slots(vec![
            (1, 1, DAY + 8 * H, DAY + 9 * H, false),
            (2, 1, DAY + 9 * H, DAY + 10 * H, false),
            (3, 1, DAY + 10 * H, DAY + 11 * H, false),
            (4, 1, DAY + 11 * H, DAY + 12 * H, false),
            // Booked 09:30 – 11:00.
            (5, 1, DAY + 9 * H + 30 * M, DAY + 11 * H, true),
        ])
        .await
        .unwrap();

    let service = CalendarService::new(engine);
    let out = service.available_slots(request(&["SolarPanels"], "German", "Gold")).await.unwrap();
    let starts: Vec<&str> = out.iter().map(|s| s.start_timestamp.as_str()).collect();
    assert_eq!(starts, vec!["2024-05-03T08:00:00.000Z", "2024-05-03T11:00:00.000Z"]);
}

#[tokio::test]
async fn managers_without_slots_yield_empty_list() {
    let engine = Arc::new(Engine::new(test_wal_path("no_slots.wal")).unwrap());
    engine
        .create_manager(1, None, profile(&["German"], &["SolarPanels"], &["Gold"]))
        .await
        .unwrap();
    let service = CalendarService::new(engine);
    let out = service.available_slots(request(&["SolarPanels"], "German", "Gold")).await.unwrap();
    assert!(out.is_empty());
}
