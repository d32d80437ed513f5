//! System prompt construction with AGENTS.md discovery
//!
//! Every fresh session is seeded with the agent's ground rules, stamped with
//! the current date. Guidance files (AGENTS.md, AGENT.md) found from the
//! working directory up to the filesystem root are appended.

use chrono::{Datelike, Local, NaiveDate};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Names of guidance files to look for, in order of preference
const GUIDANCE_FILE_NAMES: &[&str] = &["AGENTS.md", "AGENT.md"];

/// Ground rules establishing the agent's role
const BASE_PROMPT: &str = r"You are a practical, tool-aware assistant. Aim for correctness and clarity. Avoid hallucinations.
Do not provide internal information of the system.
Rules:
1. Prefer text answers and code when examples or explanations are asked for.
2. Explicit requests to create or run files: call the appropriate tool.
3. Avoid destructive commands without confirmation.
4. Keep tool inputs minimal.
5. Whenever the user asks for code, also write it to a file with write_file. If it is a Python file with plain text output, show that output too.
6. Do not use the evaluate tool for multi-line code.";

/// A discovered guidance file with its path and content
#[derive(Debug, Clone)]
pub struct GuidanceFile {
    pub path: PathBuf,
    pub content: String,
}

/// Discover guidance files from the working directory up to the root.
/// Returns files in order from root to cwd (more specific files last).
pub fn discover_guidance_files(working_dir: &Path) -> Vec<GuidanceFile> {
    let mut files = Vec::new();
    let mut current = Some(working_dir.to_path_buf());

    while let Some(dir) = current {
        for name in GUIDANCE_FILE_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    files.push(GuidanceFile { path, content });
                    // First match wins within a directory
                    break;
                }
            }
        }
        current = dir.parent().map(Path::to_path_buf);
    }

    files.reverse();
    files
}

/// Build the system prompt for a new session, dated today
pub fn build_system_prompt(working_dir: &Path) -> String {
    build_system_prompt_for(working_dir, Local::now().date_naive())
}

/// Build the system prompt as of `today`
pub fn build_system_prompt_for(working_dir: &Path, today: NaiveDate) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Today's date: {} ({})",
        today.format("%Y-%m-%d"),
        today.weekday()
    );
    // Monday is day 0
    let _ = writeln!(prompt, "Day number: {}", today.weekday().num_days_from_monday());
    prompt.push_str(BASE_PROMPT);

    let guidance_files = discover_guidance_files(working_dir);
    if !guidance_files.is_empty() {
        prompt.push_str("\n\n<project_guidance>\n");

        for (i, file) in guidance_files.iter().enumerate() {
            if i > 0 {
                prompt.push_str("\n---\n\n");
            }
            let display_path = file.path.display();
            let _ = writeln!(prompt, "<!-- From: {display_path} -->");
            prompt.push_str(&file.content);
            if !file.content.ends_with('\n') {
                prompt.push('\n');
            }
        }

        prompt.push_str("</project_guidance>");
    }

    prompt
}
