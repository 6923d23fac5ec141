use tempfile::TempDir;

use nodex::{IndexConfig, LabelScanConfig, LabelScanStore, NodeLabelUpdate, NodexError};

fn config() -> LabelScanConfig {
    LabelScanConfig {
        index: IndexConfig {
            sync_on_commit: false,
            ..IndexConfig::default()
        },
        ..LabelScanConfig::default()
    }
}

fn write_all(store: &LabelScanStore, updates: Vec<NodeLabelUpdate>) -> nodex::Result<()> {
    let mut writer = store.new_writer()?;
    for update in updates {
        writer.write(update)?;
    }
    writer.close()
}

#[test]
fn test_bitmaps_follow_label_changes() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let store = LabelScanStore::new(dir.path().join("labels"), config());
    assert!(store.init()?);
    assert!(store.is_empty()?);

    write_all(
        &store,
        vec![
            NodeLabelUpdate::added(0, vec![4]),
            NodeLabelUpdate::added(8, vec![4]),
        ],
    )?;
    let ranges = store
        .new_reader()?
        .all_node_labels()
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].range, 0);
    assert_eq!(ranges[0].bitmap(4), 0b1_0000_0001);

    write_all(&store, vec![NodeLabelUpdate::new(0, vec![4], vec![])])?;
    let ranges = store
        .new_reader()?
        .all_node_labels()
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(ranges[0].bitmap(4), 1 << 8);

    // The last node leaving a range removes its document.
    write_all(&store, vec![NodeLabelUpdate::new(8, vec![4], vec![])])?;
    assert!(store.is_empty()?);
    Ok(())
}

#[test]
fn test_out_of_order_update_is_rejected() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let store = LabelScanStore::new(dir.path().join("labels"), config());
    store.init()?;

    let mut writer = store.new_writer()?;
    writer.write(NodeLabelUpdate::added(5, vec![1]))?;
    writer.write(NodeLabelUpdate::added(5, vec![1, 2]))?;
    match writer.write(NodeLabelUpdate::added(3, vec![1])) {
        Err(NodexError::OrderingViolation { previous, next }) => {
            assert_eq!(previous, 5);
            assert_eq!(next, 3);
        }
        other => panic!("expected an ordering violation, got {other:?}"),
    }
    writer.close()?;

    let reader = store.new_reader()?;
    assert_eq!(reader.labels_for_node(5)?, vec![1, 2]);
    assert!(reader.labels_for_node(3)?.is_empty());
    Ok(())
}

#[test]
fn test_small_batches_flush_while_writing() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let store = LabelScanStore::new(
        dir.path().join("labels"),
        LabelScanConfig {
            max_batch_ranges: 1,
            max_batch_updates: 2,
            page_size: 1,
            ..config()
        },
    );
    store.init()?;

    let mut writer = store.new_writer()?;
    writer.write(NodeLabelUpdate::added(0, vec![1]))?;
    writer.write(NodeLabelUpdate::added(1, vec![1]))?;
    // The update bound was reached; both are visible before close.
    let nodes = store
        .new_reader()?
        .nodes_with_label(1)
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(nodes, vec![0, 1]);

    writer.write(NodeLabelUpdate::added(64, vec![1]))?;
    writer.write(NodeLabelUpdate::added(200, vec![1, 2]))?;
    writer.write(NodeLabelUpdate::added(1000, vec![2]))?;
    writer.close()?;

    let reader = store.new_reader()?;
    let nodes = reader
        .nodes_with_label(1)
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(nodes, vec![0, 1, 64, 200]);
    let nodes = reader
        .nodes_with_label(2)
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(nodes, vec![200, 1000]);
    assert_eq!(reader.all_node_labels().count(), 4);
    Ok(())
}

#[test]
fn test_label_combinations() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let store = LabelScanStore::new(dir.path().join("labels"), config());
    store.init()?;
    write_all(
        &store,
        vec![
            NodeLabelUpdate::added(1, vec![1, 2]),
            NodeLabelUpdate::added(2, vec![2]),
            NodeLabelUpdate::added(3, vec![3, 1]),
            NodeLabelUpdate::added(130, vec![1, 2]),
        ],
    )?;

    let reader = store.new_reader()?;
    let all = reader
        .nodes_with_all_labels(&[1, 2])
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(all, vec![1, 130]);
    let any = reader
        .nodes_with_any_label(&[3, 2])
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(any, vec![1, 2, 3, 130]);
    let one = reader
        .nodes_with_label(1)
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(one, vec![1, 3, 130]);
    assert!(reader.nodes_with_label(9).next().is_none());

    assert_eq!(reader.labels_for_node(3)?, vec![1, 3]);
    assert!(reader.labels_for_node(4)?.is_empty());

    let ranges = reader
        .all_node_labels()
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[1].range, 2);
    assert_eq!(ranges[1].labels_of(130), vec![1, 2]);
    Ok(())
}

#[test]
fn test_ranges_stay_in_their_partition() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let store = LabelScanStore::new(dir.path().join("labels"), config());
    store.init()?;
    write_all(&store, vec![NodeLabelUpdate::added(1, vec![1])])?;
    store.index().add_partition()?;

    write_all(
        &store,
        vec![
            NodeLabelUpdate::added(2, vec![2]),
            NodeLabelUpdate::added(100, vec![1]),
        ],
    )?;

    let partitions = store.index().partitions();
    assert_eq!(partitions.len(), 2);
    assert_eq!(partitions[0].num_docs(), 1);
    assert_eq!(partitions[1].num_docs(), 1);

    let reader = store.new_reader()?;
    let nodes = reader
        .nodes_with_label(1)
        .collect::<nodex::Result<Vec<_>>>()?;
    assert_eq!(nodes, vec![1, 100]);
    assert_eq!(reader.labels_for_node(2)?, vec![2]);
    assert_eq!(reader.labels_for_node(1)?, vec![1]);
    Ok(())
}

#[test]
fn test_rebuild_state_survives_restart() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("labels");
    {
        let store = LabelScanStore::new(&folder, config());
        assert!(store.init()?);
        write_all(&store, vec![NodeLabelUpdate::added(7, vec![3])])?;
        store.shutdown()?;
    }
    {
        // Never marked rebuilt.
        let store = LabelScanStore::new(&folder, config());
        assert!(store.init()?);
        store.mark_rebuilt()?;
        store.shutdown()?;
    }

    let store = LabelScanStore::new(&folder, config());
    assert!(!store.init()?);
    assert!(store.is_valid());
    assert_eq!(store.new_reader()?.labels_for_node(7)?, vec![3]);

    let snapshot = store.snapshot_files()?;
    assert!(snapshot.files().iter().all(|f| f.starts_with(&folder)));
    drop(snapshot);

    store.drop()?;
    assert!(!folder.exists());
    Ok(())
}

#[test]
fn test_failed_store_reports_failure_on_init() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("labels");
    {
        let store = LabelScanStore::new(&folder, config());
        store.init()?;
        store.mark_rebuilt()?;
        store.index().mark_failed("bitmap mismatch")?;
        store.shutdown()?;
    }

    let store = LabelScanStore::new(&folder, config());
    match store.init() {
        Err(NodexError::IllegalState(msg)) => assert!(msg.contains("bitmap mismatch")),
        other => panic!("expected the stored failure, got {other:?}"),
    }
    store.drop()?;

    let store = LabelScanStore::new(&folder, config());
    assert!(store.init()?);
    Ok(())
}
