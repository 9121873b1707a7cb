//! Integration tests for the operation engine

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use stagehand_engine::*;
    use stagehand_errors::{EngineError, Error, StorageError};
    use stagehand_events::{channel, AppEvent, OperationEvent, StageEvent};
    use stagehand_types::{
        Metadata, Operation, OperationFilter, OperationStatus, OperationTemplate, StageStatus,
    };

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::builtin()
            .with_templates([OperationTemplate::new("abc", "ABC", ["A", "B", "C"])])
            .unwrap()
    }

    fn registry_with(policy: impl AdvancePolicy + 'static) -> OperationRegistry {
        OperationRegistry::new(catalog()).with_policy(policy)
    }

    fn scripted() -> (OperationRegistry, Arc<ScriptedPolicy>) {
        let policy = Arc::new(ScriptedPolicy::default());
        let registry =
            OperationRegistry::new(catalog()).with_shared_policy(Arc::clone(&policy) as _);
        (registry, policy)
    }

    fn statuses(op: &Operation) -> Vec<StageStatus> {
        op.stages().iter().map(|s| s.status()).collect()
    }

    fn metadata(key: &str, value: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), value.to_string());
        metadata
    }

    #[test]
    fn test_create_materializes_pending_stages() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("react-app", Metadata::new()).unwrap();

        assert_eq!(op.status(), OperationStatus::Pending);
        assert_eq!(op.stages().len(), 6);
        assert!(statuses(&op).iter().all(|s| *s == StageStatus::Pending));
        assert_eq!(op.stage(5).unwrap().id(), "6-e2e-tests");
        assert_eq!(registry.get(op.id()).unwrap(), op);
    }

    #[test]
    fn test_create_unknown_template() {
        let registry = registry_with(AlwaysAdvance);
        let result = registry.create("cobol-mainframe", Metadata::new());
        assert!(matches!(
            result,
            Err(Error::Engine(EngineError::UnknownTemplate { .. }))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sequential_advancement() {
        let (registry, policy) = scripted();
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();

        let running = registry.get(op.id()).unwrap();
        assert_eq!(running.status(), OperationStatus::Running);
        assert_eq!(
            statuses(&running),
            vec![StageStatus::Running, StageStatus::Pending, StageStatus::Pending]
        );
        assert!(running.stage(0).unwrap().started_at().is_some());

        // A few holds change nothing but the tick counter
        for _ in 0..3 {
            assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Idle);
        }

        policy.push(StageDecision::Advance);
        assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Advanced);

        let after = registry.get(op.id()).unwrap();
        let a = after.stage(0).unwrap();
        let b = after.stage(1).unwrap();
        assert_eq!(a.status(), StageStatus::Succeeded);
        assert!(a.ended_at().is_some());
        assert!(a.log().iter().any(|line| line == "A completed successfully"));
        assert_eq!(b.status(), StageStatus::Running);
        assert!(b.started_at().is_some());
        assert!(b.started_at() >= a.started_at());
        assert_eq!(after.stage(2).unwrap().status(), StageStatus::Pending);
        assert_eq!(after.ticks(), 4);
    }

    #[test]
    fn test_operation_succeeds_when_every_stage_does() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();

        assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Advanced);
        assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Advanced);
        assert_eq!(
            registry.tick(op.id()).unwrap(),
            TickOutcome::Finished(OperationStatus::Succeeded)
        );

        let done = registry.get(op.id()).unwrap();
        assert_eq!(done.status(), OperationStatus::Succeeded);
        assert!(done.ended_at().is_some());
        assert!(done.total_duration().is_some());
    }

    #[test]
    fn test_fixed_step_progress() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("marketplace-sync", metadata("sync", "full")).unwrap();
        registry.trigger(op.id()).unwrap();

        for expected in [20, 40, 60, 80] {
            assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Advanced);
            let stage = registry.get(op.id()).unwrap().stage(0).unwrap().clone();
            assert_eq!(stage.progress(), Some(expected));
            assert_eq!(stage.status(), StageStatus::Running);
        }

        assert_eq!(
            registry.tick(op.id()).unwrap(),
            TickOutcome::Finished(OperationStatus::Succeeded)
        );
        let done = registry.get(op.id()).unwrap();
        assert_eq!(done.stage(0).unwrap().progress(), Some(100));
        assert_eq!(done.ticks(), 5);
    }

    #[test]
    fn test_stage_failure_is_data() {
        let (registry, policy) = scripted();
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();

        policy.push(StageDecision::fail("tests red"));
        let outcome = registry.tick(op.id()).unwrap();
        assert_eq!(outcome, TickOutcome::Finished(OperationStatus::Failed));

        let failed = registry.get(op.id()).unwrap();
        assert_eq!(
            statuses(&failed),
            vec![StageStatus::Failed, StageStatus::Skipped, StageStatus::Skipped]
        );
        assert_eq!(failed.stage(0).unwrap().log().last(), Some("A failed: tests red"));
    }

    #[test]
    fn test_trigger_twice_is_invalid_state() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();

        let err = registry.trigger(op.id()).unwrap_err();
        assert!(matches!(
            err.as_engine(),
            Some(EngineError::InvalidState { expected, actual, .. })
                if expected == "pending" && actual == "running"
        ));
    }

    #[test]
    fn test_cancel_requires_running() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();
        assert!(matches!(
            registry.cancel(op.id()),
            Err(Error::Engine(EngineError::InvalidState { .. }))
        ));
    }

    #[test]
    fn test_cancel_forces_termination() {
        let (registry, policy) = scripted();
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        policy.push(StageDecision::Advance);
        registry.tick(op.id()).unwrap();

        registry.cancel(op.id()).unwrap();

        let cancelled = registry.get(op.id()).unwrap();
        assert_eq!(cancelled.status(), OperationStatus::Cancelled);
        assert_eq!(
            statuses(&cancelled),
            vec![
                StageStatus::Succeeded,
                StageStatus::Cancelled,
                StageStatus::Pending
            ]
        );
        assert!(cancelled.ended_at().is_some());

        // Cancel wins over any later tick
        policy.push(StageDecision::Advance);
        assert_eq!(registry.tick(op.id()).unwrap(), TickOutcome::Idle);
        assert_eq!(policy.remaining(), 1);
        assert!(registry.cancel(op.id()).is_err());
    }

    #[test]
    fn test_noop_tick_leaves_state_unchanged() {
        let registry = registry_with(AlwaysAdvance);

        let pending = registry.create("abc", Metadata::new()).unwrap();
        let before = serde_json::to_vec(&registry.get(pending.id()).unwrap()).unwrap();
        assert_eq!(registry.tick(pending.id()).unwrap(), TickOutcome::Idle);
        let after = serde_json::to_vec(&registry.get(pending.id()).unwrap()).unwrap();
        assert_eq!(before, after);

        let finished = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(finished.id()).unwrap();
        while !registry.get(finished.id()).unwrap().is_terminal() {
            registry.tick(finished.id()).unwrap();
        }
        let before = serde_json::to_vec(&registry.get(finished.id()).unwrap()).unwrap();
        assert_eq!(registry.tick(finished.id()).unwrap(), TickOutcome::Idle);
        let after = serde_json::to_vec(&registry.get(finished.id()).unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unknown_operation_not_found() {
        let registry = registry_with(AlwaysAdvance);
        let id = stagehand_types::Uuid::new_v4();
        for result in [
            registry.get(id).map(|_| ()),
            registry.tick(id).map(|_| ()),
            registry.cancel(id),
            registry.trigger(id),
        ] {
            assert!(matches!(
                result,
                Err(Error::Engine(EngineError::NotFound { operation_id })) if operation_id == id
            ));
        }
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let registry = registry_with(AlwaysAdvance);
        let o1 = registry.create("abc", Metadata::new()).unwrap();
        let o2 = registry.create("abc", Metadata::new()).unwrap();
        let o3 = registry.create("abc", Metadata::new()).unwrap();

        let ids: Vec<_> = registry
            .list(&OperationFilter::new())
            .unwrap()
            .iter()
            .map(Operation::id)
            .collect();
        assert_eq!(ids, vec![o3.id(), o2.id(), o1.id()]);
    }

    #[test]
    fn test_list_filters() {
        let registry = registry_with(AlwaysAdvance);
        let main = registry.create("abc", metadata("branch", "main")).unwrap();
        let _dev = registry.create("abc", metadata("branch", "dev")).unwrap();
        let sync = registry.create("marketplace-sync", Metadata::new()).unwrap();
        registry.trigger(main.id()).unwrap();

        let running = registry
            .list(&OperationFilter::new().with_status(OperationStatus::Running))
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id(), main.id());

        let syncs = registry
            .list(&OperationFilter::new().with_template("marketplace-sync"))
            .unwrap();
        assert_eq!(syncs[0].id(), sync.id());

        let on_main = registry
            .list(&OperationFilter::new().with_metadata("branch", "main"))
            .unwrap();
        assert_eq!(on_main.len(), 1);

        let latest = registry.list(&OperationFilter::new().with_limit(2)).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id(), sync.id());
    }

    #[test]
    fn test_subscribers_receive_full_list() {
        let registry = registry_with(AlwaysAdvance);
        let seen: Arc<Mutex<Vec<Vec<OperationStatus>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let id = registry.subscribe(move |ops| {
            sink.lock()
                .unwrap()
                .push(ops.iter().map(Operation::status).collect());
        });

        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        registry.create("abc", Metadata::new()).unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert_eq!(seen[0], vec![OperationStatus::Pending]);
            assert_eq!(seen[1], vec![OperationStatus::Running]);
            assert_eq!(
                seen[2],
                vec![OperationStatus::Pending, OperationStatus::Running]
            );
        }

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.tick(op.id()).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_held_tick_does_not_publish() {
        let (registry, _policy) = scripted();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        let mut rx = registry.watch().unwrap();
        registry.tick(op.id()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Held ticks advance the counter without a new list
        assert_eq!(registry.get(op.id()).unwrap().ticks(), 1);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].ticks(), 0);
    }

    #[test]
    fn test_slow_subscriber_sees_cancel_after_concurrent_tick() {
        let registry = Arc::new(registry_with(AlwaysAdvance));
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        let rx = registry.watch().unwrap();

        let seen: Arc<Mutex<Vec<OperationStatus>>> = Arc::default();
        let sink = Arc::clone(&seen);
        registry.subscribe(move |ops| {
            if std::thread::current().name() == Some("ticker") {
                std::thread::sleep(std::time::Duration::from_millis(300));
            }
            sink.lock().unwrap().push(ops[0].status());
        });

        let ticker = {
            let registry = Arc::clone(&registry);
            let id = op.id();
            std::thread::Builder::new()
                .name("ticker".to_string())
                .spawn(move || registry.tick(id).unwrap())
                .unwrap()
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        registry.cancel(op.id()).unwrap();
        ticker.join().unwrap();

        assert_eq!(
            registry.get(op.id()).unwrap().status(),
            OperationStatus::Cancelled
        );
        assert_eq!(rx.borrow()[0].status(), OperationStatus::Cancelled);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&OperationStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_watch_feed_tracks_changes() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();

        let mut rx = registry.watch().unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        registry.trigger(op.id()).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow()[0].status(), OperationStatus::Running);
    }

    #[test]
    fn test_prune_history_keeps_recent_terminal_and_all_live() {
        let registry = registry_with(AlwaysAdvance);
        let mut finished = Vec::new();
        for _ in 0..3 {
            let op = registry.create("abc", Metadata::new()).unwrap();
            registry.trigger(op.id()).unwrap();
            registry.cancel(op.id()).unwrap();
            finished.push(op.id());
        }
        let live = registry.create("abc", Metadata::new()).unwrap();

        let evicted = registry.prune_history(1).unwrap();
        assert_eq!(evicted, vec![finished[1], finished[0]]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(finished[2]).is_ok());
        assert!(registry.get(live.id()).is_ok());

        assert!(registry.prune_history(1).unwrap().is_empty());
    }

    #[test]
    fn test_events_are_emitted_in_order() {
        let (tx, mut rx) = channel();
        let registry = OperationRegistry::new(catalog())
            .with_policy(AlwaysAdvance)
            .with_events(tx);

        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        registry.tick(op.id()).unwrap();

        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            assert_eq!(
                message.meta.correlation_id,
                Some(op.id().to_string()),
                "every event here concerns one operation"
            );
            events.push(message.event);
        }

        assert!(matches!(
            events[0],
            AppEvent::Operation(OperationEvent::Created { stage_count: 3, .. })
        ));
        assert!(matches!(
            events[1],
            AppEvent::Operation(OperationEvent::Started { .. })
        ));
        assert!(matches!(
            &events[2],
            AppEvent::Stage(StageEvent::Started { index: 0, name, .. }) if name == "A"
        ));
        assert!(matches!(
            &events[3],
            AppEvent::Stage(StageEvent::Succeeded { stage_id, .. }) if stage_id == "1-a"
        ));
        assert!(matches!(
            events[4],
            AppEvent::Stage(StageEvent::Started { index: 1, .. })
        ));
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_failure_event_carries_reason() {
        let (tx, mut rx) = channel();
        let registry = OperationRegistry::new(catalog())
            .with_policy(ScriptedPolicy::new([StageDecision::fail("disk full")]))
            .with_events(tx);

        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        registry.tick(op.id()).unwrap();

        let mut failure = None;
        let mut finished = None;
        while let Ok(message) = rx.try_recv() {
            match message.event {
                AppEvent::Stage(StageEvent::Failed { failure: f, .. }) => failure = Some(f),
                AppEvent::Operation(OperationEvent::Finished { status, .. }) => {
                    finished = Some(status);
                }
                _ => {}
            }
        }
        assert_eq!(failure.unwrap().message, "disk full");
        assert_eq!(finished, Some(OperationStatus::Failed));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("registry.json");

        let registry = registry_with(AlwaysAdvance);
        let done = registry.create("abc", metadata("branch", "main")).unwrap();
        registry.trigger(done.id()).unwrap();
        registry.tick(done.id()).unwrap();
        let pending = registry.create("marketplace-sync", Metadata::new()).unwrap();

        let snapshot = registry.snapshot().unwrap();
        snapshot.save(&path).await.unwrap();

        let loaded = RegistrySnapshot::load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);

        let restored = registry_with(AlwaysAdvance);
        assert_eq!(restored.restore(loaded).unwrap(), 2);
        assert_eq!(
            restored.list(&OperationFilter::new()).unwrap(),
            registry.list(&OperationFilter::new()).unwrap()
        );
        assert!(restored.has_running());

        // Restored running operations keep advancing
        restored.tick(done.id()).unwrap();
        assert_eq!(
            restored.get(done.id()).unwrap().running_stage(),
            Some(2)
        );
        assert_eq!(
            restored.get(pending.id()).unwrap().status(),
            OperationStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_snapshot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RegistrySnapshot::load(&dir.path().join("nope.json")).await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::PathNotFound { .. }))
        ));
    }

    #[test]
    fn test_restore_rejects_duplicate_ids() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();
        let snapshot = RegistrySnapshot::new(vec![op.clone(), op]);
        assert!(matches!(
            registry_with(AlwaysAdvance).restore(snapshot),
            Err(Error::Storage(StorageError::CorruptedSnapshot { .. }))
        ));
    }

    #[test]
    fn test_restore_rejects_unreachable_stage_states() {
        let registry = registry_with(AlwaysAdvance);
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        let before = registry.get(op.id()).unwrap();

        let edited = |edit: &dyn Fn(&mut serde_json::Value)| {
            let mut value = serde_json::to_value(registry.snapshot().unwrap()).unwrap();
            edit(&mut value);
            serde_json::from_value::<RegistrySnapshot>(value).unwrap()
        };
        let all_running = edited(&|v: &mut serde_json::Value| {
            for stage in v["operations"][0]["stages"].as_array_mut().unwrap() {
                stage["status"] = "running".into();
            }
        });
        let stalled = edited(&|v: &mut serde_json::Value| {
            v["operations"][0]["stages"][0]["status"] = "pending".into();
        });

        for snapshot in [all_running, stalled] {
            match registry.restore(snapshot) {
                Err(Error::Storage(StorageError::CorruptedSnapshot { message, .. })) => {
                    assert!(message.contains(&op.id().to_string()), "{message}");
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }

        // Rejected snapshots leave the registry untouched
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(op.id()).unwrap(), before);
        registry.tick(op.id()).unwrap();
        assert_eq!(registry.get(op.id()).unwrap().running_stage(), Some(1));
    }

    fn decision() -> impl Strategy<Value = StageDecision> {
        prop_oneof![
            4 => Just(StageDecision::Hold),
            4 => Just(StageDecision::Advance),
            1 => Just(StageDecision::fail("random failure")),
        ]
    }

    #[derive(Debug, Clone)]
    enum Step {
        Tick(StageDecision),
        Cancel,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            12 => decision().prop_map(Step::Tick),
            1 => Just(Step::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn stage_invariants_hold_for_any_sequence(
            template in prop_oneof![Just("abc"), Just("react-app"), Just("marketplace-sync")],
            steps in prop::collection::vec(step(), 0..40),
        ) {
            let (registry, policy) = scripted();
            let op = registry.create(template, Metadata::new()).unwrap();
            registry.trigger(op.id()).unwrap();
            let mut cancelled = false;

            for step in steps {
                match step {
                    Step::Tick(decision) => {
                        policy.push(decision);
                        registry.tick(op.id()).unwrap();
                    }
                    Step::Cancel => {
                        cancelled |= registry.cancel(op.id()).is_ok();
                    }
                }

                let current = registry.get(op.id()).unwrap();
                prop_assert!(current.running_count() <= 1);

                let all_terminal = current.stages().iter().all(|s| s.status().is_terminal());
                prop_assert_eq!(current.is_terminal(), all_terminal || cancelled);

                // Everything before the running stage succeeded, everything after is pending
                if let Some(index) = current.running_stage() {
                    prop_assert!(current.stages()[..index]
                        .iter()
                        .all(|s| s.status() == StageStatus::Succeeded));
                    prop_assert!(current.stages()[index + 1..]
                        .iter()
                        .all(|s| s.status() == StageStatus::Pending));
                }
            }
        }
    }
}
