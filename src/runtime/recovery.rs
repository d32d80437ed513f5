//! Crash recovery
//!
//! A stored history must never end a tool batch early: every call of an
//! assistant message is answered by the `tool_result` messages that follow.
//! Anything that breaks that (a foreign writer, an old database) is found here
//! so the store can close the gap before the model sees the history.

use crate::db::{MessageContent, ToolCallRequest};
use std::collections::HashSet;

/// Unanswered calls of one assistant message
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanGap {
    /// Index in the history where the missing results belong: just past the
    /// run of results that follows the assistant message
    pub position: usize,
    pub calls: Vec<ToolCallRequest>,
}

/// Assistant messages whose calls are not all answered by the run of
/// `tool_result` messages directly after them, in history order
pub fn find_orphan_gaps(history: &[MessageContent]) -> Vec<OrphanGap> {
    let mut gaps = Vec::new();
    let mut i = 0;

    while i < history.len() {
        let calls = history[i].tool_calls();
        i += 1;
        if calls.is_empty() {
            continue;
        }

        let mut answered = HashSet::new();
        while let Some(MessageContent::ToolResult(result)) = history.get(i) {
            answered.insert(result.call_id.as_str());
            i += 1;
        }

        let missing: Vec<ToolCallRequest> = calls
            .iter()
            .filter(|call| !answered.contains(call.call_id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            gaps.push(OrphanGap {
                position: i,
                calls: missing,
            });
        }
    }

    gaps
}
