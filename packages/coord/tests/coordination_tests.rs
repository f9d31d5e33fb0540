use std::error::Error;
use std::time::Duration;

use coord::{CoordError, MemoryCoordination, PoolInstance, QueueManager, StatusRegistry};
use paddock_core::{JobId, PoolStatus};
use ulid::Ulid;

#[tokio::test]
async fn test_dispatch_queue_is_fifo_with_tail_pushback() -> Result<(), Box<dyn Error>> {
    let queues = QueueManager::new(MemoryCoordination::new());

    queues.push("p", JobId(1), false).await?;
    queues.push("p", JobId(2), false).await?;
    queues.push("p", JobId(3), false).await?;
    assert_eq!(queues.peek_all("p").await?, vec![JobId(1), JobId(2), JobId(3)]);

    let first = queues.pop("p", Duration::ZERO).await?;
    assert_eq!(first, Some(JobId(1)));

    // Returned undispatched: delivered before the untouched work.
    queues.push("p", JobId(1), true).await?;
    assert_eq!(queues.peek_all("p").await?, vec![JobId(1), JobId(2), JobId(3)]);

    assert!(queues.peek_all("other").await?.is_empty());
    assert_eq!(queues.pop("other", Duration::from_millis(20)).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_queue_keys_are_per_pool() -> Result<(), Box<dyn Error>> {
    let store = MemoryCoordination::new();
    let queues = QueueManager::new(store.clone());

    queues.push("a", JobId(10), false).await?;
    queues.push("b", JobId(20), false).await?;

    assert_eq!(QueueManager::<MemoryCoordination>::key("a"), "paddock:to_execute:a");
    assert_eq!(queues.pop("b", Duration::ZERO).await?, Some(JobId(20)));
    assert_eq!(queues.peek_all("a").await?, vec![JobId(10)]);

    Ok(())
}

#[tokio::test]
async fn test_status_registry_round_trip() -> Result<(), Box<dyn Error>> {
    let registry = StatusRegistry::new(MemoryCoordination::new());
    let instance = Ulid::new().to_string();

    assert_eq!(registry.get_status("p", &instance).await?, None);

    registry.set_status("p", &instance, PoolStatus::Active).await?;
    registry.set_status("p", &instance, PoolStatus::Active).await?;
    assert_eq!(registry.get_status("p", &instance).await?, Some(PoolStatus::Active));

    registry.set_raw_status("p", &instance, "dead").await?;
    assert_eq!(registry.get_status("p", &instance).await?, Some(PoolStatus::Dead));

    registry.delete_status("p", &instance).await?;
    assert_eq!(registry.get_status("p", &instance).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_status_registry_rejects_unknown_status() -> Result<(), Box<dyn Error>> {
    let registry = StatusRegistry::new(MemoryCoordination::new());
    let instance = Ulid::new().to_string();
    registry.set_status("p", &instance, PoolStatus::Active).await?;

    let result = registry.set_raw_status("p", &instance, "sleeping").await;
    assert!(matches!(result, Err(CoordError::InvalidStatus(ref s)) if s == "sleeping"));
    assert_eq!(registry.get_status("p", &instance).await?, Some(PoolStatus::Active));

    Ok(())
}

#[tokio::test]
async fn test_list_all_scopes_by_pool() -> Result<(), Box<dyn Error>> {
    let store = MemoryCoordination::new();
    let registry = StatusRegistry::new(store.clone());
    let queues = QueueManager::new(store);

    registry.set_status("reports", "01A", PoolStatus::Active).await?;
    registry.set_status("reports", "01B", PoolStatus::Terminated).await?;
    registry.set_status("reports-eu", "01C", PoolStatus::Dead).await?;
    queues.push("reports", JobId(1), false).await?;

    let all = registry.list_all(None).await?;
    assert_eq!(all.len(), 3);

    let reports = registry.list_all(Some("reports")).await?;
    assert_eq!(
        reports,
        vec![
            PoolInstance {
                pool: "reports".into(),
                instance_id: "01A".into(),
                status: PoolStatus::Active,
            },
            PoolInstance {
                pool: "reports".into(),
                instance_id: "01B".into(),
                status: PoolStatus::Terminated,
            },
        ]
    );

    Ok(())
}
