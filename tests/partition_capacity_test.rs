use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use nodex::{
    IndexConfig, IndexDescriptor, IndexUpdate, IndexUpdateMode, NodexError, SchemaIndex, Value,
    ValueCodec,
};

fn config(max_partition_docs: u64) -> IndexConfig {
    IndexConfig {
        max_partition_docs,
        sync_on_commit: false,
        ..IndexConfig::default()
    }
}

fn full_index(dir: &TempDir) -> nodex::Result<SchemaIndex> {
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config(10));
    let mut populator = index.populator();
    populator.create()?;
    populator.add((1..=10).map(|i| IndexUpdate::added(i, i as f64)).collect())?;
    populator.close(true)?;
    Ok(index)
}

#[test]
fn test_insert_beyond_ceiling_fails_after_merging() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = full_index(&dir)?;
    let accessor = index.accessor()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    match updater.process(IndexUpdate::added(11, 11.0)) {
        Err(NodexError::CapacityExceeded {
            max_docs,
            current_docs,
            requested,
        }) => {
            assert_eq!(max_docs, 10);
            assert_eq!(current_docs, 10);
            assert_eq!(requested, 1);
        }
        other => panic!("expected capacity to be exceeded, got {other:?}"),
    }

    let partitions = index.index().partitions();
    let partition = &partitions[0];
    let stats = partition.writer_stats();
    assert_eq!(stats.force_merge_deletes_calls, 1);
    assert_eq!(stats.force_merge_calls, 1);
    assert_eq!(partition.capacity().reserved(), 0);
    Ok(())
}

#[test]
fn test_deleted_documents_are_reclaimed() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = full_index(&dir)?;
    let accessor = index.accessor()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::removed(1, 1.0))?;
    updater.close()?;
    accessor.force()?;
    assert_eq!(index.index().max_doc(), 10);
    assert_eq!(index.index().num_docs(), 9);

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::added(11, 11.0))?;
    updater.close()?;

    let stats = index.index().partitions()[0].writer_stats();
    assert_eq!(stats.force_merge_deletes_calls, 1);
    assert_eq!(stats.force_merge_calls, 0);
    assert_eq!(stats.docs_reclaimed, 1);
    assert_eq!(
        accessor.new_reader()?.lookup(&Value::Number(11.0))?,
        vec![11]
    );
    Ok(())
}

#[test]
fn test_new_partition_takes_further_inserts() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = full_index(&dir)?;
    let accessor = index.accessor()?;
    index.index().add_partition()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    for i in 11..=15 {
        updater.process(IndexUpdate::added(i, i as f64))?;
    }
    updater.close()?;

    let partitions = index.index().partitions();
    assert_eq!(partitions[0].num_docs(), 10);
    assert_eq!(partitions[1].num_docs(), 5);
    assert_eq!(accessor.new_reader()?.count_indexed_nodes(15, &Value::Number(15.0))?, 1);
    Ok(())
}

#[test]
fn test_population_respects_ceiling() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config(10));
    let mut populator = index.populator();
    populator.create()?;
    populator.add((1..=8).map(|i| IndexUpdate::added(i, "v")).collect())?;

    let result = populator.add((9..=11).map(|i| IndexUpdate::added(i, "v")).collect());
    assert!(matches!(
        result,
        Err(NodexError::CapacityExceeded { requested: 3, .. })
    ));
    Ok(())
}

#[test]
fn test_concurrent_inserts_release_reservations() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config(1_000));
    let mut populator = index.populator();
    populator.create()?;
    populator.close(true)?;
    index.accessor()?;
    let partitioned = Arc::clone(index.index());

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let partitioned = Arc::clone(&partitioned);
            thread::spawn(move || -> nodex::Result<()> {
                for i in 0..100u64 {
                    let entity = t * 100 + i;
                    partitioned.add_documents(vec![ValueCodec::document(
                        entity,
                        &Value::Number(entity as f64),
                    )])?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap()?;
    }

    assert_eq!(partitioned.num_docs(), 400);
    assert_eq!(partitioned.partitions()[0].capacity().reserved(), 0);
    Ok(())
}

#[test]
fn test_racing_inserts_stop_at_ceiling() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config(64));
    let mut populator = index.populator();
    populator.create()?;
    populator.close(true)?;
    index.accessor()?;
    let partitioned = Arc::clone(index.index());

    thread::scope(|scope| {
        for t in 0..16u64 {
            let partitioned = &partitioned;
            scope.spawn(move || {
                for i in 0..10u64 {
                    let entity = t * 10 + i;
                    let doc = ValueCodec::document(entity, &Value::Number(entity as f64));
                    match partitioned.add_documents(vec![doc]) {
                        Ok(()) | Err(NodexError::CapacityExceeded { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    assert_eq!(partitioned.max_doc(), 64);
    assert_eq!(partitioned.num_docs(), 64);
    assert_eq!(partitioned.partitions()[0].capacity().reserved(), 0);
    Ok(())
}

#[test]
fn test_drop_waits_for_running_task() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = full_index(&dir)?;
    index.accessor()?;

    let task = index.index().tasks().new_task()?;
    let finished = Arc::new(AtomicBool::new(false));
    let worker = {
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            while !task.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(50));
            finished.store(true, Ordering::SeqCst);
            drop(task);
        })
    };

    index.drop()?;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!dir.path().join("1").exists());
    assert!(matches!(
        index.index().tasks().new_task(),
        Err(NodexError::Cancelled(_))
    ));
    worker.join().unwrap();
    Ok(())
}
