//! Tool dispatcher
//!
//! Runs a batch of tool calls in request order and turns every outcome,
//! including unknown tools, policy refusals and panics, into a result.

use crate::db::{ToolCallRequest, ToolResultContent};
use crate::tools::{
    PolicyDecision, ToolConfirmer, ToolContext, ToolExecutionPolicy, ToolOutput, ToolRegistry,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    policy: Arc<dyn ToolExecutionPolicy>,
    confirmer: Option<Arc<dyn ToolConfirmer>>,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<dyn ToolExecutionPolicy>,
        confirmer: Option<Arc<dyn ToolConfirmer>>,
    ) -> Self {
        Self {
            registry,
            policy,
            confirmer,
        }
    }

    /// One result per call, in the same order
    pub async fn dispatch(
        &self,
        calls: &[ToolCallRequest],
        ctx: &ToolContext,
    ) -> Vec<ToolResultContent> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if ctx.cancel.is_cancelled() {
                results.push(ToolResultContent::error(
                    &call.call_id,
                    &call.tool_name,
                    "Tool execution cancelled",
                ));
                continue;
            }
            results.push(self.dispatch_one(call, ctx).await);
        }
        results
    }

    async fn dispatch_one(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolResultContent {
        let tool = match self.registry.lookup(&call.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    call_id = %call.call_id,
                    tool = %call.tool_name,
                    "Model requested an unknown tool"
                );
                return ToolResultContent::error(&call.call_id, &call.tool_name, e.to_string());
            }
        };

        let spec = tool.spec();
        match self.policy.decide(&spec, call) {
            PolicyDecision::Allow => {}
            PolicyDecision::Deny { reason } => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    tool = %call.tool_name,
                    reason = %reason,
                    "Tool call denied by policy"
                );
                return ToolResultContent::error(&call.call_id, &call.tool_name, reason);
            }
            PolicyDecision::Confirm => {
                let approved = match &self.confirmer {
                    Some(confirmer) => confirmer.confirm(&ctx.session_id, &spec, call).await,
                    None => false,
                };
                if !approved {
                    tracing::info!(
                        session_id = %ctx.session_id,
                        tool = %call.tool_name,
                        "Tool call not confirmed"
                    );
                    return ToolResultContent::error(
                        &call.call_id,
                        &call.tool_name,
                        format!(
                            "Tool '{}' requires confirmation and was not approved",
                            call.tool_name
                        ),
                    );
                }
            }
        }

        tracing::info!(
            session_id = %ctx.session_id,
            call_id = %call.call_id,
            tool = %call.tool_name,
            "Executing tool"
        );
        let start = Instant::now();

        let input = Value::Object(call.arguments.clone());
        let tool_ctx = ctx.clone();
        let handle = tokio::spawn(async move { tool.run(input, tool_ctx).await });

        let output = match handle.await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(tool = %call.tool_name, error = %e, "Tool task failed");
                ToolOutput::error(format!("Tool '{}' failed unexpectedly", call.tool_name))
            }
        };

        tracing::info!(
            session_id = %ctx.session_id,
            call_id = %call.call_id,
            tool = %call.tool_name,
            success = output.success,
            duration_ms = %start.elapsed().as_millis(),
            "Tool finished"
        );

        ToolResultContent {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            content: output.output,
            is_error: !output.success,
            kind: output.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ResultKind;
    use crate::runtime::testing::{PanickingTool, RecordingConfirmer};
    use crate::tools::{test_context, AddTool, RuleAction, RulePolicy, WriteFileTool};
    use serde_json::json;

    fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest::new(id, name, args.as_object().cloned().unwrap_or_default())
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AddTool)).unwrap();
        registry.register(Arc::new(WriteFileTool)).unwrap();
        registry.register(Arc::new(PanickingTool)).unwrap();
        Arc::new(registry)
    }

    fn dispatcher(policy: RulePolicy, confirmer: Option<Arc<dyn ToolConfirmer>>) -> ToolDispatcher {
        ToolDispatcher::new(registry(), Arc::new(policy), confirmer)
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::allow_all(), None);
        let calls = vec![
            call("c1", "add", json!({"a": 2, "b": 3})),
            call("c2", "add", json!({"a": 10, "b": -4})),
        ];

        let results = d.dispatch(&calls, &test_context(dir.path())).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "c1");
        assert_eq!(results[0].content, "5");
        assert_eq!(results[1].call_id, "c2");
        assert_eq!(results[1].content, "6");
        assert!(results.iter().all(|r| !r.is_error));
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::allow_all(), None);
        let calls = vec![
            call("c1", "add", json!({"a": 1, "b": 1})),
            call("c2", "teleport", json!({})),
            call("c3", "add", json!({"a": 2, "b": 2})),
        ];

        let results = d.dispatch(&calls, &test_context(dir.path())).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[1].content.contains("teleport"));
        assert_eq!(results[1].tool_name, "teleport");
        assert_eq!(results[2].content, "4");
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::allow_all(), None);
        let results = d
            .dispatch(&[call("c1", "add", json!({"a": "two"}))], &test_context(dir.path()))
            .await;
        assert!(results[0].is_error);
        assert!(results[0].content.starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::allow_all(), None);
        let calls = vec![
            call("c1", "panic", json!({})),
            call("c2", "add", json!({"a": 1, "b": 2})),
        ];

        let results = d.dispatch(&calls, &test_context(dir.path())).await;

        assert!(results[0].is_error);
        assert!(results[0].content.contains("failed unexpectedly"));
        assert_eq!(results[1].content, "3");
    }

    #[tokio::test]
    async fn test_denied_tool_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::new(RuleAction::Deny), None);
        let args = json!({"name": "notes", "extension": "txt", "content": "hi"});

        let results = d
            .dispatch(&[call("c1", "write_file", args)], &test_context(dir.path()))
            .await;

        assert!(results[0].is_error);
        assert!(results[0].content.contains("disabled"));
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_confirm_without_confirmer_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::default(), None);
        let args = json!({"name": "notes", "extension": "txt", "content": "hi"});

        let results = d
            .dispatch(&[call("c1", "write_file", args)], &test_context(dir.path()))
            .await;

        assert!(results[0].is_error);
        assert!(results[0].content.contains("requires confirmation"));
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_confirmed_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let confirmer = Arc::new(RecordingConfirmer::new(true));
        let d = dispatcher(RulePolicy::default(), Some(confirmer.clone()));
        let args = json!({"name": "notes", "extension": "txt", "content": "hi"});

        let results = d
            .dispatch(
                &[call("c1", "write_file", args), call("c2", "add", json!({"a": 1, "b": 1}))],
                &test_context(dir.path()),
            )
            .await;

        assert!(!results[0].is_error);
        assert_eq!(results[0].kind, ResultKind::FilePath);
        assert!(dir.path().join("notes.txt").exists());
        // Non-destructive tools never reach the confirmer
        assert_eq!(confirmer.asked(), vec!["write_file".to_string()]);
    }

    #[tokio::test]
    async fn test_declined_tool_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let confirmer = Arc::new(RecordingConfirmer::new(false));
        let d = dispatcher(RulePolicy::default(), Some(confirmer.clone()));
        let args = json!({"name": "notes", "extension": "txt", "content": "hi"});

        let results = d
            .dispatch(&[call("c1", "write_file", args)], &test_context(dir.path()))
            .await;

        assert!(results[0].is_error);
        assert!(!dir.path().join("notes.txt").exists());
        assert_eq!(confirmer.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_remaining_calls() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(RulePolicy::allow_all(), None);
        let ctx = test_context(dir.path());
        ctx.cancel.cancel();

        let results = d
            .dispatch(&[call("c1", "add", json!({"a": 1, "b": 1}))], &ctx)
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].content.contains("cancelled"));
    }
}
