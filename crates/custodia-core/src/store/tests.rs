//! Tests for the storage layer.

use tempfile::TempDir;

use super::*;
use crate::custody::{verify_events, ChainVerification, CustodyAction, EventFilter, NewCustodyEvent};
use crate::destruction::{
    ApprovalLevel, ApprovalStatus, DestructionMethod, DestructionRequest, DestructionState, Witness,
};
use crate::identity::{Role, User};
use crate::item::{Item, ItemStatus, Location, LocationKind, LocationStatus};
use crate::transfer::{TransferRequest, TransferState, Urgency};

/// Helper to create a temporary on-disk store for testing.
fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test_custodia.db");
    let store = Store::open(&path).expect("failed to open store");
    (store, dir)
}

fn test_item(code: &str) -> Item {
    Item {
        code: code.to_string(),
        kind: "Drugs".to_string(),
        category: "Cocaine".to_string(),
        description: Some("white crystalline powder".to_string()),
        quantity: 2.5,
        unit: "kg".to_string(),
        serial_number: None,
        case_number: Some("CASE-2024-0156".to_string()),
        status: ItemStatus::Registered,
        custody_location: None,
        seized_by: "officer.bekele".to_string(),
        agency: Some("Federal Police".to_string()),
        notes: None,
        created_at: crate::custody::canonical_now(),
    }
}

fn test_location(id: &str, name: &str, capacity: u32) -> Location {
    Location {
        id: id.to_string(),
        name: name.to_string(),
        address: Some("Industrial Zone".to_string()),
        kind: LocationKind::Warehouse,
        capacity,
        current_items: 0,
        manager: "dawit.haile".to_string(),
        contact: None,
        status: LocationStatus::Active,
        over_capacity: false,
    }
}

fn test_user(username: &str, role: Role) -> User {
    User {
        id: format!("id-{username}"),
        username: username.to_string(),
        display_name: username.to_string(),
        role,
        station: None,
        active: true,
        mfa_enabled: false,
        created_at: crate::custody::canonical_now(),
    }
}

fn seed_item(store: &Store, code: &str) {
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_item(&test_item(code)))
        .expect("failed to insert item");
}

#[test]
fn test_open_and_in_memory() {
    let (_store, _dir) = temp_store();
    Store::in_memory().expect("failed to create in-memory store");
}

#[test]
fn test_item_round_trip() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");

    let item = store
        .get_item("CNB-2024-001")
        .expect("query failed")
        .expect("item should exist");
    assert_eq!(item.kind, "Drugs");
    assert_eq!(item.status, ItemStatus::Registered);
    assert_eq!(item.custody_location, None);
    assert_eq!(item.case_number.as_deref(), Some("CASE-2024-0156"));

    assert!(store.get_item("CNB-0000-000").expect("query failed").is_none());
}

#[test]
fn test_update_custody_is_compare_and_swap() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_location(&test_location("loc-1", "Warehouse A", 10)))
        .expect("insert location");

    let swapped = store
        .with_txn::<_, StoreError>(|txn| {
            txn.update_custody(
                "CNB-2024-001",
                Some("loc-1"),
                ItemStatus::InStorage,
                ItemStatus::Registered,
            )
        })
        .expect("txn failed");
    assert!(swapped);

    // Second swap against the stale expected status must miss.
    let swapped = store
        .with_txn::<_, StoreError>(|txn| {
            txn.update_custody(
                "CNB-2024-001",
                Some("loc-1"),
                ItemStatus::InStorage,
                ItemStatus::Registered,
            )
        })
        .expect("txn failed");
    assert!(!swapped);

    let item = store.get_item("CNB-2024-001").expect("query").expect("item");
    assert_eq!(item.status, ItemStatus::InStorage);
    assert_eq!(item.custody_location.as_deref(), Some("loc-1"));
}

#[test]
fn test_append_event_assigns_gapless_sequence_and_chain() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");

    for action in [
        CustodyAction::Seize,
        CustodyAction::TransferRequest,
        CustodyAction::TransferApprove,
    ] {
        store
            .with_txn::<_, StoreError>(|txn| {
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: "CNB-2024-001".to_string(),
                        action,
                        actor: "officer.bekele".to_string(),
                        from_location: None,
                        to_location: None,
                        notes: None,
                    },
                    crate::custody::canonical_now(),
                )
            })
            .expect("append failed");
    }

    let events = store.events_for_item("CNB-2024-001").expect("read events");
    assert_eq!(events.len(), 3);
    assert_eq!(
        events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(events[1].prev_hash, events[0].hash);
    assert_eq!(events[2].prev_hash, events[1].hash);
    assert_eq!(verify_events(&events), ChainVerification::Verified);
}

#[test]
fn test_event_chain_survives_storage_round_trip() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");

    let appended = store
        .with_txn::<_, StoreError>(|txn| {
            txn.append_event(
                &NewCustodyEvent {
                    item_code: "CNB-2024-001".to_string(),
                    action: CustodyAction::Seize,
                    actor: "officer.bekele".to_string(),
                    from_location: None,
                    to_location: Some("loc-1".to_string()),
                    notes: Some("initial registration".to_string()),
                },
                crate::custody::canonical_now(),
            )
        })
        .expect("append failed");

    let stored = store.events_for_item("CNB-2024-001").expect("read events");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].hash, appended.hash);
    assert_eq!(stored[0].timestamp, appended.timestamp);
    assert_eq!(verify_events(&stored), ChainVerification::Verified);
}

#[test]
fn test_query_events_filters_by_item_and_actor() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    seed_item(&store, "CNB-2024-002");

    for (code, actor) in [
        ("CNB-2024-001", "officer.bekele"),
        ("CNB-2024-002", "officer.tadesse"),
        ("CNB-2024-001", "officer.tadesse"),
    ] {
        store
            .with_txn::<_, StoreError>(|txn| {
                txn.append_event(
                    &NewCustodyEvent {
                        item_code: code.to_string(),
                        action: CustodyAction::Seize,
                        actor: actor.to_string(),
                        from_location: None,
                        to_location: None,
                        notes: None,
                    },
                    crate::custody::canonical_now(),
                )
            })
            .expect("append failed");
    }

    let all = store.query_events(&EventFilter::default()).expect("query");
    assert_eq!(all.len(), 3);

    let by_item = store
        .query_events(&EventFilter {
            item_code: Some("CNB-2024-001".to_string()),
            ..EventFilter::default()
        })
        .expect("query");
    assert_eq!(by_item.len(), 2);

    let by_actor = store
        .query_events(&EventFilter {
            actor: Some("officer.tadesse".to_string()),
            ..EventFilter::default()
        })
        .expect("query");
    assert_eq!(by_actor.len(), 2);
}

#[test]
fn test_user_round_trip_and_deactivate() {
    let (store, _dir) = temp_store();
    let user = test_user("sara.tekle", Role::Auditor);
    store
        .insert_user(&user, "salt$deadbeef")
        .expect("insert user");

    let (loaded, hash) = store
        .get_user_with_credentials("sara.tekle")
        .expect("query")
        .expect("user should exist");
    assert_eq!(loaded.role, Role::Auditor);
    assert!(loaded.active);
    assert_eq!(hash, "salt$deadbeef");

    let deactivated = store
        .deactivate_user(&user.id)
        .expect("deactivate")
        .expect("user should exist");
    assert!(!deactivated.active);

    assert!(store.deactivate_user("missing-id").expect("deactivate").is_none());
}

#[test]
fn test_duplicate_username_is_rejected() {
    let (store, _dir) = temp_store();
    let user = test_user("sara.tekle", Role::Auditor);
    store.insert_user(&user, "salt$aa").expect("insert user");

    let mut dup = test_user("sara.tekle", Role::Admin);
    dup.id = "other-id".to_string();
    assert!(store.insert_user(&dup, "salt$bb").is_err());
}

fn test_transfer(id: &str, item_code: &str) -> TransferRequest {
    TransferRequest {
        id: id.to_string(),
        item_code: item_code.to_string(),
        from_location: None,
        to_location: "loc-1".to_string(),
        requested_by: "officer.bekele".to_string(),
        requested_at: crate::custody::canonical_now(),
        urgency: Urgency::Normal,
        reason: "initial storage".to_string(),
        state: TransferState::Pending,
        approved_by: None,
        approved_at: None,
        received_by: None,
        received_at: None,
        notes: None,
    }
}

#[test]
fn test_transfer_round_trip_and_state_cas() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_location(&test_location("loc-1", "Warehouse A", 10)))
        .expect("insert location");
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_transfer(&test_transfer("tr-1", "CNB-2024-001")))
        .expect("insert transfer");

    let active = store
        .with_txn::<_, StoreError>(|txn| txn.active_transfer_for_item("CNB-2024-001"))
        .expect("query")
        .expect("active transfer should exist");
    assert_eq!(active.id, "tr-1");
    assert_eq!(active.state, TransferState::Pending);

    let approved = store
        .with_txn::<_, StoreError>(|txn| {
            txn.transfer_mark_approved("tr-1", "supervisor.tadesse", crate::custody::canonical_now())
        })
        .expect("txn");
    assert!(approved);

    // Approving again must miss: the request is no longer pending.
    let approved_again = store
        .with_txn::<_, StoreError>(|txn| {
            txn.transfer_mark_approved("tr-1", "supervisor.tadesse", crate::custody::canonical_now())
        })
        .expect("txn");
    assert!(!approved_again);

    let loaded = store.get_transfer("tr-1").expect("query").expect("transfer");
    assert_eq!(loaded.state, TransferState::Approved);
    assert_eq!(loaded.approved_by.as_deref(), Some("supervisor.tadesse"));

    let completed = store
        .with_txn::<_, StoreError>(|txn| {
            txn.transfer_mark_completed("tr-1", "dawit.haile", crate::custody::canonical_now())
        })
        .expect("txn");
    assert!(completed);

    // Terminal: the active-transfer lookup no longer finds it.
    let active = store
        .with_txn::<_, StoreError>(|txn| txn.active_transfer_for_item("CNB-2024-001"))
        .expect("query");
    assert!(active.is_none());
}

#[test]
fn test_one_active_transfer_per_item_index() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_location(&test_location("loc-1", "Warehouse A", 10)))
        .expect("insert location");
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_transfer(&test_transfer("tr-1", "CNB-2024-001")))
        .expect("insert transfer");

    let second = store
        .with_txn::<_, StoreError>(|txn| txn.insert_transfer(&test_transfer("tr-2", "CNB-2024-001")));
    assert!(second.is_err(), "partial unique index should reject a second active transfer");
}

#[test]
fn test_location_count_and_over_capacity_flag() {
    let (store, _dir) = temp_store();
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_location(&test_location("loc-1", "Vault B", 1)))
        .expect("insert location");

    let loc = store
        .with_txn::<_, StoreError>(|txn| txn.adjust_location_count("loc-1", 1))
        .expect("adjust");
    assert_eq!(loc.current_items, 1);
    assert!(!loc.over_capacity);

    let loc = store
        .with_txn::<_, StoreError>(|txn| txn.adjust_location_count("loc-1", 1))
        .expect("adjust");
    assert_eq!(loc.current_items, 2);
    assert!(loc.over_capacity, "alarm must raise above capacity");

    let loc = store
        .with_txn::<_, StoreError>(|txn| txn.adjust_location_count("loc-1", -1))
        .expect("adjust");
    assert_eq!(loc.current_items, 1);
    assert!(!loc.over_capacity, "alarm must clear at capacity");
}

#[test]
fn test_destruction_round_trip() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    seed_item(&store, "CNB-2024-002");

    let request = DestructionRequest {
        id: "dr-1".to_string(),
        item_codes: vec!["CNB-2024-001".to_string(), "CNB-2024-002".to_string()],
        requested_by: "admin.chief".to_string(),
        requested_at: crate::custody::canonical_now(),
        method: DestructionMethod::Incineration,
        scheduled_date: Some("2024-02-01".parse().expect("date")),
        legal_reason: "court order 2024/17".to_string(),
        state: DestructionState::Draft,
        approvals: vec![
            ApprovalLevel {
                level: 1,
                required_role: Role::Supervisor,
                status: ApprovalStatus::Pending,
                approver: None,
                decided_at: None,
                notes: None,
            },
            ApprovalLevel {
                level: 2,
                required_role: Role::Admin,
                status: ApprovalStatus::Pending,
                approver: None,
                decided_at: None,
                notes: None,
            },
        ],
        witnesses: vec![
            Witness {
                name: "Legal Advisor Hanna".to_string(),
                role: "legal".to_string(),
            },
            Witness {
                name: "Environmental Officer Sara".to_string(),
                role: "environmental".to_string(),
            },
        ],
        executed_by: None,
        executed_at: None,
    };
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_destruction(&request))
        .expect("insert destruction");

    let loaded = store
        .get_destruction("dr-1")
        .expect("query")
        .expect("request should exist");
    assert_eq!(loaded.item_codes.len(), 2);
    assert_eq!(loaded.approvals.len(), 2);
    assert_eq!(loaded.witnesses.len(), 2);
    assert_eq!(loaded.method, DestructionMethod::Incineration);
    assert_eq!(loaded.scheduled_date, request.scheduled_date);
    assert_eq!(loaded.state, DestructionState::Draft);

    let active = store
        .with_txn::<_, StoreError>(|txn| txn.item_in_active_destruction("CNB-2024-001"))
        .expect("query");
    assert!(active);
}

#[test]
fn test_decide_approval_is_single_shot() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");
    let mut request = DestructionRequest {
        id: "dr-1".to_string(),
        item_codes: vec!["CNB-2024-001".to_string()],
        requested_by: "admin.chief".to_string(),
        requested_at: crate::custody::canonical_now(),
        method: DestructionMethod::Crushing,
        scheduled_date: None,
        legal_reason: "expired evidence".to_string(),
        state: DestructionState::PendingApproval,
        approvals: vec![ApprovalLevel {
            level: 1,
            required_role: Role::Supervisor,
            status: ApprovalStatus::Pending,
            approver: None,
            decided_at: None,
            notes: None,
        }],
        witnesses: Vec::new(),
        executed_by: None,
        executed_at: None,
    };
    request.witnesses.push(Witness {
        name: "W1".to_string(),
        role: "r".to_string(),
    });
    store
        .with_txn::<_, StoreError>(|txn| txn.insert_destruction(&request))
        .expect("insert destruction");

    let decided = store
        .with_txn::<_, StoreError>(|txn| {
            txn.decide_approval(
                "dr-1",
                1,
                ApprovalStatus::Approved,
                "supervisor.tadesse",
                crate::custody::canonical_now(),
                None,
            )
        })
        .expect("txn");
    assert!(decided);

    let decided_again = store
        .with_txn::<_, StoreError>(|txn| {
            txn.decide_approval(
                "dr-1",
                1,
                ApprovalStatus::Approved,
                "someone.else",
                crate::custody::canonical_now(),
                None,
            )
        })
        .expect("txn");
    assert!(!decided_again, "a decided level must not be re-decidable");
}

#[test]
fn test_next_item_code_is_sequential_per_year() {
    let (store, _dir) = temp_store();
    let code = store
        .with_txn::<_, StoreError>(|txn| txn.next_item_code(2024))
        .expect("txn");
    assert_eq!(code, "CNB-2024-001");

    seed_item(&store, "CNB-2024-001");
    let code = store
        .with_txn::<_, StoreError>(|txn| txn.next_item_code(2024))
        .expect("txn");
    assert_eq!(code, "CNB-2024-002");

    let other_year = store
        .with_txn::<_, StoreError>(|txn| txn.next_item_code(2025))
        .expect("txn");
    assert_eq!(other_year, "CNB-2025-001");
}

#[test]
fn test_rollback_on_error_leaves_no_partial_state() {
    let (store, _dir) = temp_store();
    seed_item(&store, "CNB-2024-001");

    let result: Result<(), StoreError> = store.with_txn(|txn| {
        txn.append_event(
            &NewCustodyEvent {
                item_code: "CNB-2024-001".to_string(),
                action: CustodyAction::Seize,
                actor: "officer.bekele".to_string(),
                from_location: None,
                to_location: None,
                notes: None,
            },
            crate::custody::canonical_now(),
        )?;
        Err(StoreError::Corrupt {
            detail: "forced failure".to_string(),
        })
    });
    assert!(result.is_err());

    let events = store.events_for_item("CNB-2024-001").expect("read events");
    assert!(events.is_empty(), "rolled-back append must not persist");
}
