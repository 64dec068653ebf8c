#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end tests for session reconciliation.
//!
//! Drives `SessionReconciler` with a scripted lab API against an in-memory
//! catalog store:
//! - reload state transitions and action-triggered reloads
//! - flag submission outcomes and ownership persistence
//! - playable catalog refresh and initial sync

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use htbpanel_core::api::{FlagResponse, MachineRecord, TagBatch, TagRecord, VpnRecord};
use htbpanel_core::models::{
    ActiveBox, ActiveVpn, Difficulty, MachineAction, OwnType, TagCategory, UserInfo,
};
use htbpanel_core::{
    Activity, CatalogRefresh, Database, Error, FlagOutcome, LabApi, Result, SessionReconciler,
    sync,
};

fn record(id: i64, name: &str, free: bool) -> MachineRecord {
    MachineRecord {
        id,
        name: name.into(),
        difficulty: Difficulty::Easy,
        os: "Linux".into(),
        free,
        user_owned: false,
        root_owned: false,
    }
}

fn running(id: i64) -> ActiveBox {
    ActiveBox {
        id,
        name: format!("box-{id}"),
        difficulty: Difficulty::Medium,
        os: "Linux".into(),
        user_owned: false,
        root_owned: false,
        ip: Some("10.10.11.5".into()),
    }
}

/// Lab API double that replays scripted replies and records calls.
#[derive(Default)]
struct ScriptedApi {
    boxes: Mutex<VecDeque<Option<ActiveBox>>>,
    playable: Mutex<Vec<MachineRecord>>,
    retired: Vec<MachineRecord>,
    flag_replies: Mutex<VecDeque<FlagResponse>>,
    actions: Mutex<Vec<(MachineAction, i64)>>,
    flag_calls: AtomicUsize,
    retired_calls: AtomicUsize,
    fail_vpn: AtomicBool,
}

impl ScriptedApi {
    fn script_boxes(&self, boxes: impl IntoIterator<Item = Option<ActiveBox>>) {
        self.boxes.lock().unwrap().extend(boxes);
    }

    fn reply_to_flag(&self, message: &str, own_type: Option<&str>) {
        self.flag_replies.lock().unwrap().push_back(FlagResponse {
            message: message.into(),
            own_type: own_type.map(Into::into),
            success: own_type.map(|_| true),
        });
    }
}

impl LabApi for ScriptedApi {
    async fn fetch_user_info(&self) -> Result<UserInfo> {
        Ok(UserInfo {
            id: 1,
            name: "alice".into(),
            can_access_vip: false,
        })
    }

    async fn fetch_playable_machines(&self) -> Result<Vec<MachineRecord>> {
        Ok(self.playable.lock().unwrap().clone())
    }

    async fn fetch_retired_machines(&self) -> Result<Vec<MachineRecord>> {
        self.retired_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.retired.clone())
    }

    async fn fetch_vpns(&self) -> Result<Vec<VpnRecord>> {
        Ok(vec![VpnRecord {
            id: 7,
            name: "EU Free 1".into(),
        }])
    }

    async fn fetch_tags(&self, machine_ids: &[i64]) -> Result<TagBatch> {
        let mut batch = TagBatch::default();
        for id in machine_ids {
            batch.push_machine(
                *id,
                vec![TagRecord {
                    id: 100,
                    category: TagCategory::AreaOfInterest,
                    name: "Web".into(),
                }],
            );
        }
        Ok(batch)
    }

    async fn fetch_active_box(&self) -> Result<Option<ActiveBox>> {
        Ok(self.boxes.lock().unwrap().pop_front().flatten())
    }

    async fn fetch_active_vpn(&self) -> Result<ActiveVpn> {
        if self.fail_vpn.load(Ordering::SeqCst) {
            return Err(Error::RequestFailed {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(ActiveVpn {
            id: 7,
            name: "EU Free 1".into(),
            ip: Some("10.10.14.2".into()),
            address: Some("edge-eu-free-1.example.com:1337".into()),
        })
    }

    async fn machine_action(&self, action: MachineAction, machine_id: i64) -> Result<()> {
        self.actions.lock().unwrap().push((action, machine_id));
        // The platform reports the spawned machine on the next poll.
        let next = match action {
            MachineAction::Start | MachineAction::Reset => Some(running(machine_id)),
            MachineAction::Stop => None,
        };
        self.boxes.lock().unwrap().push_front(next);
        Ok(())
    }

    async fn submit_flag(&self, _machine_id: i64, _flag: &str) -> Result<FlagResponse> {
        self.flag_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.flag_replies.lock().unwrap().pop_front().unwrap())
    }
}

async fn reconciler_with(api: ScriptedApi) -> SessionReconciler<ScriptedApi> {
    let db = Database::open_in_memory().await.unwrap();
    SessionReconciler::new(api, db)
}

async fn seeded_reconciler(api: ScriptedApi) -> SessionReconciler<ScriptedApi> {
    let reconciler = reconciler_with(api).await;
    let batch = htbpanel_core::api::MachineBatch {
        active: vec![record(42, "Lame", true)],
        retired: vec![record(9, "Legacy", true)],
    };
    reconciler.db().add_machines(&batch).await.unwrap();
    reconciler
}

// === Reload ===

#[tokio::test]
async fn reload_follows_running_idle_running() {
    let api = ScriptedApi::default();
    api.script_boxes([Some(running(7)), None]);
    let reconciler = reconciler_with(api).await;
    let mut rx = reconciler.subscribe();
    assert_eq!(reconciler.state().activity(), Activity::Idle);

    let state = reconciler.reload().await.unwrap();
    assert_eq!(state.activity(), Activity::Running);
    assert_eq!(state.active_box.unwrap().id, 7);
    assert!(rx.has_changed().unwrap());
    drop(rx.borrow_and_update());

    let state = reconciler.reload().await.unwrap();
    assert_eq!(state.activity(), Activity::Idle);
    assert_eq!(state.active_vpn.unwrap().id, 7);
    assert!(rx.has_changed().unwrap());

    let state = reconciler
        .machine_action(MachineAction::Start, 42)
        .await
        .unwrap();
    assert_eq!(state.activity(), Activity::Running);
    assert_eq!(state.active_box.unwrap().id, 42);
    assert_eq!(reconciler.state(), rx.borrow_and_update().clone());
    assert_eq!(
        *reconciler.api().actions.lock().unwrap(),
        vec![(MachineAction::Start, 42)]
    );
}

#[tokio::test]
async fn stop_action_returns_to_idle() {
    let api = ScriptedApi::default();
    api.script_boxes([Some(running(3))]);
    let reconciler = reconciler_with(api).await;
    reconciler.reload().await.unwrap();

    let state = reconciler
        .machine_action(MachineAction::Stop, 3)
        .await
        .unwrap();
    assert_eq!(state.activity(), Activity::Idle);
}

#[tokio::test]
async fn failed_reload_keeps_previous_snapshot() {
    let api = ScriptedApi::default();
    api.script_boxes([Some(running(5)), None]);
    let reconciler = reconciler_with(api).await;
    let before = reconciler.reload().await.unwrap();

    reconciler.api().fail_vpn.store(true, Ordering::SeqCst);
    let err = reconciler.reload().await.unwrap_err();
    assert!(matches!(err, Error::RequestFailed { status: 503, .. }));
    assert!(err.is_transient());
    assert_eq!(reconciler.state(), before);
    assert_eq!(reconciler.state().activity(), Activity::Running);
}

// === Flags ===

#[tokio::test]
async fn incorrect_flag_is_rejected_without_changes() {
    let api = ScriptedApi::default();
    api.script_boxes([Some(running(42))]);
    api.reply_to_flag("Incorrect flag!", None);
    let reconciler = seeded_reconciler(api).await;
    let before = reconciler.reload().await.unwrap();

    let outcome = reconciler
        .submit_flag(42, "0123456789abcdef0123456789abcdef")
        .await
        .unwrap();
    assert!(matches!(outcome, FlagOutcome::Rejected { ref message } if message == "Incorrect flag!"));

    let machine = reconciler.db().find_machine("42").await.unwrap();
    assert!(!machine.user_own);
    assert!(!machine.root_own);
    assert_eq!(reconciler.state(), before);
}

#[tokio::test]
async fn root_flag_marks_root_only() {
    let api = ScriptedApi::default();
    api.script_boxes([Some(running(42))]);
    api.reply_to_flag("Lame root is now owned.", Some("root"));
    let reconciler = seeded_reconciler(api).await;
    reconciler.reload().await.unwrap();

    let outcome = reconciler.submit_flag(42, " deadbeef ").await.unwrap();
    assert_eq!(
        outcome,
        FlagOutcome::Accepted {
            own_type: OwnType::Root,
            message: "Lame root is now owned.".into(),
        }
    );
    assert_eq!(reconciler.api().flag_calls.load(Ordering::SeqCst), 1);

    let machine = reconciler.db().find_machine("Lame").await.unwrap();
    assert!(machine.root_own);
    assert!(!machine.user_own);

    let active = reconciler.state().active_box.unwrap();
    assert!(active.root_owned);
    assert!(!active.user_owned);
}

#[tokio::test]
async fn invalid_flag_never_reaches_the_api() {
    let reconciler = seeded_reconciler(ScriptedApi::default()).await;

    let too_long = "a".repeat(33);
    for bad in ["", "flag{not-hex}", too_long.as_str()] {
        let err = reconciler.submit_flag(42, bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{bad:?}");
    }
    assert_eq!(reconciler.api().flag_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reply_without_own_type_is_malformed() {
    let api = ScriptedApi::default();
    api.reply_to_flag("Something unexpected", None);
    let reconciler = seeded_reconciler(api).await;

    let err = reconciler.submit_flag(42, "abc123").await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
    let machine = reconciler.db().find_machine("42").await.unwrap();
    assert!(!machine.user_own && !machine.root_own);
}

#[tokio::test]
async fn accepted_flag_for_uncached_machine_is_still_accepted() {
    let api = ScriptedApi::default();
    api.reply_to_flag("Ghost user is now owned.", Some("user"));
    let reconciler = seeded_reconciler(api).await;

    let outcome = reconciler.submit_flag(1234, "abc123").await.unwrap();
    assert_eq!(
        outcome,
        FlagOutcome::Accepted {
            own_type: OwnType::User,
            message: "Ghost user is now owned.".into(),
        }
    );
    assert!(reconciler.db().find_machine("1234").await.is_err());
    let cached = reconciler.db().find_machine("42").await.unwrap();
    assert!(!cached.user_own);
}

// === Catalog refresh and sync ===

#[tokio::test]
async fn refresh_catalog_only_writes_when_rotation_changes() {
    let api = ScriptedApi {
        retired: vec![record(9, "Legacy", true), record(10, "Bastion", false)],
        ..ScriptedApi::default()
    };
    *api.playable.lock().unwrap() = vec![record(1, "Alpha", false), record(2, "Beta", true)];
    let reconciler = reconciler_with(api).await;
    let db = reconciler.db().clone();

    assert_eq!(sync::ensure_machines(&db, reconciler.api(), false).await.unwrap(), 4);
    assert_eq!(db.active_machine_ids().await.unwrap(), vec![1, 2]);
    assert_eq!(reconciler.api().retired_calls.load(Ordering::SeqCst), 1);

    let refresh = reconciler.refresh_catalog().await.unwrap();
    assert_eq!(refresh, CatalogRefresh::Unchanged);
    assert_eq!(reconciler.api().retired_calls.load(Ordering::SeqCst), 1);

    reconciler
        .api()
        .playable
        .lock()
        .unwrap()
        .push(record(3, "Gamma", false));
    let refresh = reconciler.refresh_catalog().await.unwrap();
    assert_eq!(refresh, CatalogRefresh::Updated { new_ids: vec![3] });

    assert_eq!(db.active_machine_ids().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(db.count_machines().await.unwrap(), 5);
    // Only free retired machines keep the free flag.
    let free: Vec<String> = db
        .machines_for_account(false)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(free, vec!["Alpha", "Beta", "Gamma", "Legacy"]);
}

#[tokio::test]
async fn initial_sync_skips_populated_tables() {
    let api = ScriptedApi {
        retired: vec![record(9, "Legacy", true)],
        ..ScriptedApi::default()
    };
    *api.playable.lock().unwrap() = vec![record(1, "Alpha", true)];
    let reconciler = reconciler_with(api).await;
    let db = reconciler.db();
    let api = reconciler.api();

    assert_eq!(sync::ensure_vpns(db, api, false).await.unwrap(), 1);
    assert_eq!(sync::ensure_vpns(db, api, false).await.unwrap(), 0);
    assert_eq!(sync::ensure_vpns(db, api, true).await.unwrap(), 1);
    assert_eq!(db.count_vpns().await.unwrap(), 1);

    assert_eq!(sync::ensure_machines(db, api, false).await.unwrap(), 2);
    assert_eq!(sync::ensure_machines(db, api, false).await.unwrap(), 0);

    assert_eq!(sync::backfill_tags(db, api).await.unwrap(), 1);
    assert!(db.machines_missing_tags().await.unwrap().is_empty());
    assert_eq!(sync::backfill_tags(db, api).await.unwrap(), 0);
}
