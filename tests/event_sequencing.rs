//! Two concurrent writers recording events on the same frame.

use serde_json::{json, Map};
use stackmemory::{ColdStorageProvider, Engine, EngineConfig, EventType, FrameType, ProjectId, Result, RunId};
use std::sync::Arc;

struct NoopProvider;
impl ColdStorageProvider for NoopProvider {
    fn upload(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
    fn download(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
    fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[test]
fn two_concurrent_writers_produce_two_hundred_unique_contiguous_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.store.db_path = dir.path().join("memory.db").to_string_lossy().to_string();
    config.store.durability = stackmemory::DurabilityMode::Strict;
    let engine = Arc::new(Engine::new(ProjectId::new("p1"), config, Arc::new(NoopProvider), None).unwrap());

    let run_id = RunId::new("run-1");
    let frame_id = engine.create_frame(run_id, FrameType::Task, "root", Map::new(), None).unwrap();

    let writers: Vec<_> = (0..2)
        .map(|writer| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    engine.record_event(frame_id, EventType::ToolCall, json!({"writer": writer, "i": i})).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let events = engine.get_events(frame_id);
    assert_eq!(events.len(), 200);
    let mut seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    seqs.sort_unstable();
    let expected: Vec<u64> = (1..=200).collect();
    assert_eq!(seqs, expected);
}
