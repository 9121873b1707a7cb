//! Scheduler tests on a paused clock

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use stagehand_config::SchedulerConfig;
    use stagehand_engine::*;
    use stagehand_errors::{EngineError, Error};
    use stagehand_events::{channel, AppEvent, SchedulerEvent};
    use stagehand_types::{Metadata, OperationStatus, OperationTemplate, StageStatus};

    fn registry() -> Arc<OperationRegistry> {
        let catalog = TemplateCatalog::builtin()
            .with_templates([OperationTemplate::new("abc", "ABC", ["A", "B", "C"])])
            .unwrap();
        Arc::new(OperationRegistry::new(catalog).with_policy(AlwaysAdvance))
    }

    fn config(tick_interval_ms: u64, stop_when_idle: bool) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_ms,
            stop_when_idle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_drives_operation_to_completion() {
        let registry = registry();
        let scheduler = Scheduler::new(Arc::clone(&registry), &config(100, false));
        let op = registry.create("abc", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();

        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let midway = registry.get(op.id()).unwrap();
        assert_eq!(midway.stage(0).unwrap().status(), StageStatus::Succeeded);
        assert_eq!(midway.running_stage(), Some(1));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            registry.get(op.id()).unwrap().status(),
            OperationStatus::Succeeded
        );

        let passes = scheduler.stop().await.unwrap();
        assert!(passes >= 3);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_scheduler_parks_until_trigger() {
        let (tx, mut rx) = channel();
        let catalog = TemplateCatalog::builtin();
        let registry = Arc::new(
            OperationRegistry::new(catalog)
                .with_policy(AlwaysAdvance)
                .with_events(tx),
        );
        let scheduler = Scheduler::new(Arc::clone(&registry), &config(100, true));
        scheduler.start().unwrap();

        // Nothing is running, so no passes happen
        tokio::time::sleep(Duration::from_secs(5)).await;

        let op = registry.create("static-site", Metadata::new()).unwrap();
        registry.trigger(op.id()).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(
            registry.get(op.id()).unwrap().status(),
            OperationStatus::Succeeded
        );

        let passes = scheduler.stop().await.unwrap();
        assert_eq!(passes, 3);

        let mut scheduler_events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Scheduler(event) = message.event {
                scheduler_events.push(event);
            }
        }
        assert!(matches!(
            scheduler_events.first(),
            Some(SchedulerEvent::Started { interval_ms: 100 })
        ));
        assert!(scheduler_events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::Resumed)));
        assert!(matches!(
            scheduler_events.last(),
            Some(SchedulerEvent::Stopped { passes: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_limit_applied_after_pass() {
        let registry = registry();
        let scheduler =
            Scheduler::new(Arc::clone(&registry), &config(100, false)).with_history_limit(Some(1));

        for _ in 0..3 {
            let op = registry.create("abc", Metadata::new()).unwrap();
            registry.trigger(op.id()).unwrap();
            registry.cancel(op.id()).unwrap();
        }
        assert_eq!(registry.len(), 3);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.len(), 1);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idle() {
        let scheduler = Scheduler::new(registry(), &config(50, true));
        assert!(matches!(
            scheduler.stop().await,
            Err(Error::Engine(EngineError::SchedulerNotRunning))
        ));

        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(Error::Engine(EngineError::SchedulerAlreadyRunning))
        ));
        assert_eq!(scheduler.stop().await.unwrap(), 0);

        // Restartable after a stop
        scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = Scheduler::new(registry(), &config(0, true));
        assert!(matches!(scheduler.start(), Err(Error::Config(_))));
        assert!(!scheduler.is_running());
    }
}
