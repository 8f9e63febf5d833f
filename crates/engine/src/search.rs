//! `search_frames`: a ranked, filtered scan over a project's frames.
//!
//! There is no inverted index here — the store has no full-text engine and
//! the design deliberately stops short of one (see the explicit Non-goal
//! against general-purpose search). This is a linear scan, bounded by
//! project, that scores term overlap against each frame's name, digest, and
//! inputs/outputs, filtered first by any hard constraints the caller gave.

use stackmemory_core::{Frame, FrameId, FrameType, ProjectId};
use stackmemory_store::Store;

/// Optional hard filters applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Only frames created within `[start, end]` (unix seconds).
    pub time_range: Option<(i64, i64)>,
    /// Only frames of this type.
    pub frame_type: Option<FrameType>,
    /// Substring that must appear somewhere in the frame's recorded
    /// content (digest text or inputs/outputs payload).
    pub content: Option<String>,
    /// Substring that must appear in the frame's inputs or outputs
    /// payload, read loosely as "who touched this" (actor/author/user
    /// fields a host embeds there; there is no dedicated people field).
    pub people: Option<String>,
    /// Substring that must appear in the frame's outputs payload.
    pub output: Option<String>,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching frame.
    pub frame_id: FrameId,
    /// Its name, for display without a second lookup.
    pub name: String,
    /// Relevance score; higher is more relevant. Not normalized across
    /// calls, only meaningful as a sort key within one result set.
    pub relevance: f64,
}

/// Search `project_id`'s frames for `query`, applying `filters` as hard
/// constraints before ranking. An empty query still applies filters and
/// ranks remaining frames by recency.
pub fn search_frames(store: &Store, project_id: &ProjectId, query: &str, filters: &SearchFilters) -> Vec<SearchHit> {
    let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();

    let mut hits: Vec<SearchHit> = store
        .frames_by_project(project_id)
        .into_iter()
        .filter(|frame| passes_filters(frame, filters))
        .map(|frame| SearchHit { relevance: relevance(&frame, &terms), frame_id: frame.frame_id, name: frame.name })
        .collect();

    hits.sort_by(|a, b| {
        b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal).then(a.frame_id.to_string().cmp(&b.frame_id.to_string()))
    });
    hits
}

fn passes_filters(frame: &Frame, filters: &SearchFilters) -> bool {
    if let Some((start, end)) = filters.time_range {
        if frame.created_at < start || frame.created_at > end {
            return false;
        }
    }
    if let Some(frame_type) = filters.frame_type {
        if frame.frame_type != frame_type {
            return false;
        }
    }
    if let Some(needle) = &filters.content {
        if !haystack(frame).to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    }
    if let Some(needle) = &filters.people {
        if !serde_json::Value::Object(frame.inputs.clone()).to_string().to_lowercase().contains(&needle.to_lowercase())
            && !serde_json::Value::Object(frame.outputs.clone()).to_string().to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
    }
    if let Some(needle) = &filters.output {
        if !serde_json::Value::Object(frame.outputs.clone()).to_string().to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    }
    true
}

fn haystack(frame: &Frame) -> String {
    format!(
        "{} {} {} {}",
        frame.name,
        frame.digest_text.clone().unwrap_or_default(),
        serde_json::Value::Object(frame.inputs.clone()),
        serde_json::Value::Object(frame.outputs.clone()),
    )
}

fn relevance(frame: &Frame, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return frame.created_at as f64;
    }
    let haystack = haystack(frame).to_lowercase();
    let matches = terms.iter().filter(|term| haystack.contains(term.as_str())).count();
    matches as f64 + frame.score
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::config::{DurabilityMode, StoreConfig};
    use stackmemory_core::{Frame as CoreFrame, FrameId as CoreFrameId, FrameType, RunId};
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Store {
        let mut cfg = StoreConfig::default();
        cfg.db_path = dir.join("memory.db").to_string_lossy().to_string();
        cfg.durability = DurabilityMode::Strict;
        Store::open(&cfg).unwrap()
    }

    fn frame(run: &RunId, project: &ProjectId, name: &str, now: i64) -> CoreFrame {
        CoreFrame::new(CoreFrameId::new(), run.clone(), project.clone(), None, 0, FrameType::Task, name.to_string(), serde_json::Map::new(), now)
    }

    #[test]
    fn query_term_matches_frame_name() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let matching = frame(&run, &project, "fix the parser bug", 0);
        let other = frame(&run, &project, "unrelated work", 0);
        store.insert_frame(matching.clone()).unwrap();
        store.insert_frame(other).unwrap();

        let hits = search_frames(&store, &project, "parser", &SearchFilters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frame_id, matching.frame_id);
    }

    #[test]
    fn frame_type_filter_excludes_non_matching_frames() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let task = frame(&run, &project, "a task", 0);
        let mut review = frame(&run, &project, "a review", 0);
        review.frame_type = FrameType::Review;
        store.insert_frame(task).unwrap();
        store.insert_frame(review.clone()).unwrap();

        let filters = SearchFilters { frame_type: Some(FrameType::Review), ..SearchFilters::default() };
        let hits = search_frames(&store, &project, "", &filters);
        assert_eq!(hits, vec![SearchHit { frame_id: review.frame_id, name: "a review".to_string(), relevance: 0.0 }]);
    }

    #[test]
    fn time_range_filter_excludes_frames_outside_window() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let early = frame(&run, &project, "old", 0);
        let late = frame(&run, &project, "new", 1000);
        store.insert_frame(early).unwrap();
        store.insert_frame(late.clone()).unwrap();

        let filters = SearchFilters { time_range: Some((500, 2000)), ..SearchFilters::default() };
        let hits = search_frames(&store, &project, "", &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frame_id, late.frame_id);
    }
}
