//! Execution policy for tool calls
//!
//! Every call is checked before it runs. Tools flagged destructive (shell,
//! file writes) are the ones a policy normally guards.

use super::ToolSpec;
use crate::db::ToolCallRequest;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
    /// Run only if a confirmer approves
    Confirm,
}

pub trait ToolExecutionPolicy: Send + Sync {
    fn decide(&self, spec: &ToolSpec, request: &ToolCallRequest) -> PolicyDecision;
}

/// Asks an operator (or an automated stand-in) to approve a guarded call
#[async_trait]
pub trait ToolConfirmer: Send + Sync {
    async fn confirm(&self, session_id: &str, spec: &ToolSpec, request: &ToolCallRequest) -> bool;
}

/// Action configured for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleAction {
    Allow,
    Deny,
    #[default]
    Confirm,
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            "confirm" => Ok(Self::Confirm),
            other => Err(format!(
                "invalid tool policy '{other}' (expected allow, deny or confirm)"
            )),
        }
    }
}

/// Policy driven by a default for destructive tools plus per-tool overrides
#[derive(Debug, Clone, Default)]
pub struct RulePolicy {
    destructive: RuleAction,
    overrides: HashMap<String, RuleAction>,
}

impl RulePolicy {
    pub fn new(destructive: RuleAction) -> Self {
        Self {
            destructive,
            overrides: HashMap::new(),
        }
    }

    /// Everything runs unguarded
    pub fn allow_all() -> Self {
        Self::new(RuleAction::Allow)
    }

    /// Override the action for one tool, destructive or not
    #[must_use]
    pub fn with_rule(mut self, tool_name: impl Into<String>, action: RuleAction) -> Self {
        self.overrides.insert(tool_name.into(), action);
        self
    }
}

impl ToolExecutionPolicy for RulePolicy {
    fn decide(&self, spec: &ToolSpec, _request: &ToolCallRequest) -> PolicyDecision {
        let action = match self.overrides.get(&spec.name) {
            Some(action) => *action,
            None if spec.destructive => self.destructive,
            None => RuleAction::Allow,
        };

        match action {
            RuleAction::Allow => PolicyDecision::Allow,
            RuleAction::Deny => PolicyDecision::Deny {
                reason: format!("Tool '{}' is disabled by the execution policy", spec.name),
            },
            RuleAction::Confirm => PolicyDecision::Confirm,
        }
    }
}
