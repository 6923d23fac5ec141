use tempfile::TempDir;

use nodex::{
    IndexConfig, IndexDescriptor, IndexQuery, IndexState, IndexUpdate, IndexUpdateMode,
    NodexError, SchemaIndex, Value,
};

fn config() -> IndexConfig {
    IndexConfig {
        sync_on_commit: false,
        ..IndexConfig::default()
    }
}

fn populated_index(dir: &TempDir) -> nodex::Result<SchemaIndex> {
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config());
    let mut populator = index.populator();
    populator.create()?;
    populator.add(vec![
        IndexUpdate::added(1, -5.0),
        IndexUpdate::added(2, 3.0),
        IndexUpdate::added(3, 10.0),
        IndexUpdate::added(4, 22.0),
        IndexUpdate::added(5, "hello world"),
        IndexUpdate::added(6, vec![1.0, 2.0]),
        IndexUpdate::added(7, true),
    ])?;
    populator.close(true)?;
    Ok(index)
}

#[test]
fn test_population_marks_index_online() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    assert_eq!(index.state(), IndexState::Closed);
    assert!(index.is_valid());

    index.accessor()?;
    assert!(index.is_online());
    assert!(dir.path().join("1").join("failure").exists());
    assert!(dir.path().join("1").join("partition-1").exists());
    Ok(())
}

#[test]
fn test_numeric_range_and_negation() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let reader = index.accessor()?.new_reader()?;

    assert_eq!(reader.query(&IndexQuery::less_than(10.0))?, vec![1, 2]);
    assert_eq!(reader.query(&IndexQuery::less_than(10.0).negate())?, vec![3, 4]);
    assert_eq!(
        reader.query(&IndexQuery::NumberRange {
            lower: Some(3.0),
            upper: Some(22.0),
            include_lower: false,
            include_upper: true,
        })?,
        vec![3, 4]
    );
    Ok(())
}

#[test]
fn test_value_shapes_are_distinct() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let reader = index.accessor()?.new_reader()?;

    assert_eq!(reader.lookup(&Value::from(vec![1.0, 2.0]))?, vec![6]);
    assert!(reader.lookup(&Value::from(vec![1.0]))?.is_empty());
    assert!(reader.lookup(&Value::Number(1.0))?.is_empty());
    assert_eq!(reader.lookup(&Value::Bool(true))?, vec![7]);
    assert!(reader.lookup(&Value::from("true"))?.is_empty());
    assert_eq!(reader.query(&IndexQuery::Exists)?, vec![1, 2, 3, 4, 5, 6, 7]);
    Ok(())
}

#[test]
fn test_prefix_and_suffix_queries() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let reader = index.accessor()?.new_reader()?;

    assert_eq!(
        reader.query(&IndexQuery::StringPrefix("hello".to_string()))?,
        vec![5]
    );
    assert_eq!(
        reader.query(&IndexQuery::StringSuffix("world".to_string()))?,
        vec![5]
    );
    assert!(
        reader
            .query(&IndexQuery::StringSuffix("hello".to_string()))?
            .is_empty()
    );
    Ok(())
}

#[test]
fn test_online_updates() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let accessor = index.accessor()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::changed(2, 3.0, 50.0))?;
    updater.process(IndexUpdate::removed(5, "hello world"))?;
    updater.process(IndexUpdate::added(8, "fresh"))?;
    updater.close()?;

    let reader = accessor.new_reader()?;
    assert!(reader.lookup(&Value::Number(3.0))?.is_empty());
    assert_eq!(reader.lookup(&Value::Number(50.0))?, vec![2]);
    assert!(reader.lookup(&Value::from("hello world"))?.is_empty());
    assert_eq!(reader.lookup(&Value::from("fresh"))?, vec![8]);

    // A reader keeps its point in time.
    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::added(9, "later"))?;
    updater.close()?;
    assert!(reader.lookup(&Value::from("later"))?.is_empty());
    assert_eq!(accessor.new_reader()?.lookup(&Value::from("later"))?, vec![9]);
    Ok(())
}

#[test]
fn test_recovery_add_is_idempotent() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let accessor = index.accessor()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Recovery)?;
    updater.process(IndexUpdate::added(10, "x"))?;
    updater.process(IndexUpdate::added(10, "x"))?;
    updater.close()?;

    let reader = accessor.new_reader()?;
    assert_eq!(reader.count_indexed_nodes(10, &Value::from("x"))?, 1);
    assert_eq!(reader.lookup(&Value::from("x"))?, vec![10]);
    Ok(())
}

#[test]
fn test_updates_survive_restart() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let index = populated_index(&dir)?;
        let accessor = index.accessor()?;
        let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
        updater.process(IndexUpdate::added(11, 11.0))?;
        updater.close()?;
        accessor.force()?;
        accessor.close()?;
    }

    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(1), config());
    let reader = index.accessor()?.new_reader()?;
    assert!(index.is_online());
    assert_eq!(reader.lookup(&Value::Number(11.0))?, vec![11]);
    Ok(())
}

#[test]
fn test_partitioned_reads_and_updates() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let accessor = index.accessor()?;
    index.index().add_partition()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::added(20, 5.0))?;
    updater.process(IndexUpdate::changed(1, -5.0, 6.0))?;
    updater.close()?;

    let partitions = index.index().partitions();
    assert_eq!(partitions.len(), 2);
    assert_eq!(partitions[1].num_docs(), 2);

    let reader = accessor.new_reader()?;
    assert_eq!(reader.query(&IndexQuery::less_than(10.0))?, vec![1, 2, 20]);
    assert_eq!(reader.count_indexed_nodes(1, &Value::Number(-5.0))?, 0);
    assert_eq!(reader.count_indexed_nodes(1, &Value::Number(6.0))?, 1);

    let mut entries = reader.all_entries().collect::<nodex::Result<Vec<_>>>()?;
    entries.sort_by_key(|(id, _)| *id);
    assert_eq!(entries.len(), 8);
    assert_eq!(entries[0], (1, Value::Number(6.0)));
    Ok(())
}

#[test]
fn test_sampling_counts_distinct_values() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let accessor = index.accessor()?;

    let mut updater = accessor.new_updater(IndexUpdateMode::Online)?;
    updater.process(IndexUpdate::added(30, 3.0))?;
    updater.process(IndexUpdate::added(31, 3.0))?;
    updater.close()?;

    let sample = index.sample()?;
    assert_eq!(sample.index_size, 9);
    assert_eq!(sample.unique_values, 7);
    assert_eq!(sample.sample_size, 9);
    Ok(())
}

#[test]
fn test_read_only_index_rejects_updates() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    populated_index(&dir)?;

    let index = SchemaIndex::new(
        dir.path(),
        IndexDescriptor::general(1),
        config().into_read_only(),
    );
    let accessor = index.accessor()?;
    assert!(matches!(
        accessor.new_updater(IndexUpdateMode::Online),
        Err(NodexError::IllegalState(_))
    ));
    assert_eq!(accessor.new_reader()?.lookup(&Value::Number(22.0))?, vec![4]);
    Ok(())
}

#[test]
fn test_failed_population_is_recorded() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = SchemaIndex::new(dir.path(), IndexDescriptor::general(3), config());
    let mut populator = index.populator();
    populator.create()?;
    populator.add(vec![IndexUpdate::added(1, 1.0)])?;
    populator.mark_as_failed("scan aborted")?;
    populator.close(false)?;

    index.open()?;
    assert_eq!(index.state(), IndexState::Failed);
    assert_eq!(index.failure()?.as_deref(), Some("scan aborted"));

    index.drop()?;
    assert!(!dir.path().join("3").exists());
    Ok(())
}

#[test]
fn test_snapshot_files_live_in_index_folder() -> nodex::Result<()> {
    let dir = TempDir::new().unwrap();
    let index = populated_index(&dir)?;
    let accessor = index.accessor()?;
    let snapshot = accessor.snapshot_files()?;
    assert!(!snapshot.files().is_empty());
    for file in snapshot.files() {
        assert!(file.starts_with(dir.path().join("1")));
        assert!(file.exists());
    }
    Ok(())
}
