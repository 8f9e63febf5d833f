//! Close-time digest generation: deterministic fields extracted from a
//! frame's events, optionally enriched by a `Summarizer` call.

use stackmemory_core::{
    AiDigest, DeterministicDigest, DigestJson, Event, EventType, Frame, Summarizer,
};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::time::Duration;

/// Extract the deterministic 60% of a digest from a frame's events.
pub fn build_deterministic(frame: &Frame, events: &[Event], now: i64) -> DeterministicDigest {
    let mut files_touched: HashSet<String> = HashSet::new();
    let mut tool_call_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut error_count = 0u64;

    for event in events {
        match event.event_type {
            EventType::ToolCall => {
                let tool = event
                    .payload
                    .get("tool")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                *tool_call_counts.entry(tool).or_insert(0) += 1;
            }
            EventType::Error => error_count += 1,
            _ => {}
        }
        if let Some(path) = event
            .payload
            .get("path")
            .or_else(|| event.payload.get("file"))
            .and_then(|v| v.as_str())
        {
            files_touched.insert(path.to_string());
        }
    }

    let mut files_touched: Vec<String> = files_touched.into_iter().collect();
    files_touched.sort();

    let closed_at = frame.closed_at.unwrap_or(now);
    let exit_outcome = if error_count > 0 { "error" } else { "ok" }.to_string();

    DeterministicDigest {
        events_count: events.len() as u64,
        files_touched,
        tool_call_counts,
        error_count,
        duration_secs: (closed_at - frame.created_at).max(0),
        exit_outcome,
    }
}

/// Render the deterministic digest as prompt-ready text for the
/// `Summarizer`. The core never interprets this string; it's opaque to the
/// memory engine once handed off.
pub fn render_context(frame: &Frame, deterministic: &DeterministicDigest) -> String {
    format!(
        "frame: {} ({})\nevents: {}\nfiles touched: {}\nerrors: {}\nduration_secs: {}",
        frame.name,
        frame.frame_type.as_str(),
        deterministic.events_count,
        deterministic.files_touched.join(", "),
        deterministic.error_count,
        deterministic.duration_secs,
    )
}

/// Build the full digest: deterministic fields plus, if a `Summarizer` is
/// configured and responds within `timeout`, the AI-generated portion.
pub fn generate(
    frame: &Frame,
    events: &[Event],
    now: i64,
    summarizer: Option<&dyn Summarizer>,
    timeout: Duration,
) -> DigestJson {
    let deterministic = build_deterministic(frame, events, now);

    let Some(summarizer) = summarizer else {
        return DigestJson::deterministic_only(deterministic);
    };

    let context = render_context(frame, &deterministic);
    match summarizer.summarize(&context, timeout) {
        Ok(output) => DigestJson::hybrid(
            deterministic,
            AiDigest {
                summary: output.summary,
                key_decisions: output.key_decisions,
                learned_insights: output.insights,
                next_steps: output.next_steps,
            },
        ),
        Err(err) => {
            tracing::warn!(frame_id = %frame.frame_id, error = %err, "summarizer failed or timed out; writing deterministic-only digest");
            DigestJson::deterministic_only(deterministic)
        }
    }
}
