//! Property-based checks that hold regardless of the specific sequence of
//! frame/event operations a caller issues.

use proptest::prelude::*;
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

fn engine(dir: &std::path::Path) -> Engine {
    let mut config = EngineConfig::default();
    config.store.db_path = dir.join("memory.db").to_string_lossy().to_string();
    config.store.durability = stackmemory::DurabilityMode::Strict;
    Engine::new(ProjectId::new("p1"), config, Arc::new(NoopProvider), None).unwrap()
}

/// A scripted op: push a child frame, or record an event on a still-open
/// frame, identified by its position among frames opened so far.
#[derive(Debug, Clone)]
enum Op {
    Push { parent_index: Option<usize> },
    RecordEvent { frame_index: usize },
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (0..8usize).prop_map(|i| Op::RecordEvent { frame_index: i }),
            prop::option::of(0..8usize).prop_map(|p| Op::Push { parent_index: p }),
        ],
        1..60,
    )
}

proptest! {
    #[test]
    fn frame_depth_and_event_sequence_invariants_hold(ops in ops()) {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let run_id = RunId::new("run-1");
        let mut frames: Vec<stackmemory::FrameId> = Vec::new();

        for op in ops {
            match op {
                Op::Push { parent_index } => {
                    let parent = parent_index.and_then(|i| frames.get(i)).copied();
                    if let Ok(frame_id) = engine.create_frame(run_id.clone(), FrameType::Task, "node", Map::new(), parent) {
                        frames.push(frame_id);
                    }
                }
                Op::RecordEvent { frame_index } => {
                    if let Some(frame_id) = frames.get(frame_index).copied() {
                        let _ = engine.record_event(frame_id, EventType::Note, json!({"i": frame_index}));
                    }
                }
            }
        }

        for &frame_id in &frames {
            let frame = engine.get_frame(frame_id).unwrap();
            match frame.parent_frame_id {
                None => prop_assert_eq!(frame.depth, 0),
                Some(parent_id) => {
                    let parent = engine.get_frame(parent_id).unwrap();
                    prop_assert_eq!(frame.depth, parent.depth + 1);
                }
            }

            let events = engine.get_events(frame_id);
            let mut seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
            seqs.sort_unstable();
            let expected: Vec<u64> = (1..=events.len() as u64).collect();
            prop_assert_eq!(seqs, expected);
        }
    }
}
