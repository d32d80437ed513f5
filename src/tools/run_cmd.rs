//! Shell command execution

use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const MAX_OUTPUT_LENGTH: usize = 128 * 1024;
const SNIP_SIZE: usize = 4 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RunCmdInput {
    command: String,
}

/// Runs a command through `sh -c` in the session's working directory
pub struct RunCmdTool {
    timeout: Duration,
}

impl Default for RunCmdTool {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RunCmdTool {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn execute(&self, command: &str, ctx: &ToolContext) -> ToolOutput {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("Failed to spawn process: {e}")),
        };

        let pid = child.id();
        tracing::debug!(session_id = %ctx.session_id, pid, command, "Command started");

        tokio::select! {
            biased;

            () = ctx.cancel.cancelled() => {
                Self::kill_process_group(pid);
                ToolOutput::error("[command cancelled]")
            }

            () = tokio::time::sleep(self.timeout) => {
                Self::kill_process_group(pid);
                ToolOutput::error(format!("[command timed out after {:?}]", self.timeout))
            }

            result = child.wait_with_output() => {
                match result {
                    Ok(output) => {
                        let stdout = String::from_utf8_lossy(&output.stdout);
                        let stderr = String::from_utf8_lossy(&output.stderr);

                        if output.status.success() {
                            ToolOutput::success(Self::truncate_output(&format!("{stdout}{stderr}")))
                        } else {
                            let exit_code = output.status.code().unwrap_or(-1);
                            let detail = if stderr.is_empty() { stdout } else { stderr };
                            ToolOutput::error(format!(
                                "[command failed: exit code {exit_code}]\n{}",
                                Self::truncate_output(&detail)
                            ))
                        }
                    }
                    Err(e) => ToolOutput::error(format!("Command execution failed: {e}")),
                }
            }
        }
    }

    #[cfg(unix)]
    fn kill_process_group(pid: Option<u32>) {
        let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        tracing::debug!(pgid, "Sending SIGKILL to process group");
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    fn kill_process_group(_pid: Option<u32>) {}

    /// Keep the head and tail of oversized output
    fn truncate_output(output: &str) -> String {
        if output.len() <= MAX_OUTPUT_LENGTH {
            return output.to_string();
        }

        let mut head_end = SNIP_SIZE;
        while !output.is_char_boundary(head_end) {
            head_end -= 1;
        }
        let mut tail_start = output.len() - SNIP_SIZE;
        while !output.is_char_boundary(tail_start) {
            tail_start += 1;
        }

        format!(
            "[output truncated in middle: got {} bytes, max is {} bytes]\n{}\n\n[snip]\n\n{}",
            output.len(),
            MAX_OUTPUT_LENGTH,
            output.get(..head_end).unwrap_or_default(),
            output.get(tail_start..).unwrap_or_default()
        )
    }
}

#[async_trait]
impl Tool for RunCmdTool {
    fn name(&self) -> &'static str {
        "run_cmd_command"
    }

    fn description(&self) -> String {
        format!(
            "Run a shell command via sh -c and return its combined output. \
             State (working directory, variables) does not persist between calls. \
             Commands time out after {} seconds. Never run destructive commands \
             without the user's explicit confirmation.",
            self.timeout.as_secs()
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                }
            }
        })
    }

    fn destructive(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: RunCmdInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        if input.command.trim().is_empty() {
            return ToolOutput::error("Command cannot be empty");
        }

        self.execute(&input.command, &ctx).await
    }
}
