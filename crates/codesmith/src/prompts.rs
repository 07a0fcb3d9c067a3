//! Prompt text for each model call in the pipeline.
//!
//! Bump `PROMPT_VERSION` whenever a preamble changes; it is recorded in the
//! prompt audit log so a reply can be traced back to the wording that
//! produced it.

use std::fmt::Write as _;

use coordination::{ProjectSnapshot, TaskKind, WorkItem};

pub const PROMPT_VERSION: &str = "1.2.0";

/// Planner preamble, appended to the caller's system prompt.
pub const PLANNER_PREAMBLE: &str = "\
You are the planning stage of a code generation pipeline. Decide which files \
the task requires and call the `plan_files` tool exactly once.

## Rules
- List every file that must be created or changed, each exactly once.
- TaskId 0 means the file already exists in the project and must be modified.
- TaskId 1 means the file is new and must be created.
- Use the exact paths shown in the project snapshot for existing files.
- Do not include files that need no change.";

/// Generator preamble for one file.
pub const GENERATOR_PREAMBLE: &str = "\
You are the code generation stage of a pipeline. Produce the complete content \
of exactly one file and return it through the `write_file` tool.

## Rules
- Return the full file, never a diff, an excerpt or a placeholder comment.
- Put the code in the Content field as a plain JSON string; do not escape braces.
- Use the FilePath you were given.";

/// Merge preamble: old and new versions in, union out.
pub const MERGE_PREAMBLE: &str = "\
You merge two versions of the same source file. The EXISTING version is what \
is on disk now; the GENERATED version was just written for a new task. \
Produce one file that keeps everything the existing version does and adds \
everything the generated version introduces. Return the complete merged file \
through the `merge_file` tool.

## Rules
- Never drop existing functionality unless the generated version replaces it.
- Return the full file, never a diff.";

/// Reformat preamble: used only when structured output could not be recovered.
pub const REFORMAT_PREAMBLE: &str = "\
You receive source code that was damaged by JSON escaping. Reproduce it \
verbatim, fixing only escaping artifacts, so it can be inserted directly into \
a file. Reply with a single fenced code block and nothing else.";

fn system_with(base: &str, preamble: &str, memory: &str) -> String {
    let mut out = String::new();
    if !base.trim().is_empty() {
        out.push_str(base.trim_end());
        out.push_str("\n\n");
    }
    out.push_str(preamble);
    if !memory.trim().is_empty() {
        out.push_str("\n\n# Project memory\n\n");
        out.push_str(memory.trim_end());
    }
    out
}

pub fn planner_system(system_prompt: &str, memory: &str) -> String {
    system_with(system_prompt, PLANNER_PREAMBLE, memory)
}

pub fn planner_user(task: &str, snapshot: &ProjectSnapshot) -> String {
    let mut out = format!("# Task\n\n{}\n\n# Project snapshot\n\n", task.trim());
    if snapshot.is_empty() {
        out.push_str("(no files included)\n");
    } else {
        out.push_str(&snapshot.render());
    }
    out
}

/// Modify items get the snapshot in the system prompt; create items do not.
pub fn generator_system(
    system_prompt: &str,
    memory: &str,
    item: &WorkItem,
    snapshot: &ProjectSnapshot,
) -> String {
    let mut out = system_with(system_prompt, GENERATOR_PREAMBLE, memory);
    if item.kind() == TaskKind::Modify && !snapshot.is_empty() {
        out.push_str("\n\n# Project snapshot\n\n");
        out.push_str(&snapshot.render());
    }
    out
}

pub fn generator_user(task: &str, item: &WorkItem) -> String {
    let action = match item.kind() {
        TaskKind::Modify => "Modify the existing file",
        TaskKind::Create => "Create the new file",
    };
    let mut out = String::new();
    let _ = writeln!(out, "# Task\n\n{}\n", task.trim());
    let _ = writeln!(out, "# Your file\n\n{action} `{}`.", item.file_path());
    out
}

pub fn merge_system(system_prompt: &str, memory: &str) -> String {
    system_with(system_prompt, MERGE_PREAMBLE, memory)
}

pub fn merge_user(path: &str, existing: &str, generated: &str) -> String {
    format!(
        "# File\n\n`{path}`\n\n# EXISTING version\n\n```\n{}\n```\n\n# GENERATED version\n\n```\n{}\n```\n",
        existing.trim_end(),
        generated.trim_end()
    )
}

pub fn reformat_user(content: &str) -> String {
    format!("```\n{}\n```", content.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProjectSnapshot {
        ProjectSnapshot::from_entries([("Foo.cs", "old")])
    }

    #[test]
    fn planner_prompt_carries_task_and_snapshot() {
        let user = planner_user("add logging", &snapshot());
        assert!(user.contains("add logging"));
        assert!(user.contains("### File: Foo.cs"));
        let sys = planner_system("Be careful.", "## Memory: style.md\nTabs.");
        assert!(sys.starts_with("Be careful."));
        assert!(sys.contains("plan_files"));
        assert!(sys.contains("Tabs."));
    }

    #[test]
    fn only_modify_items_embed_the_snapshot() {
        let modify = WorkItem::new("Foo.cs", TaskKind::Modify);
        let create = WorkItem::new("Bar.cs", TaskKind::Create);
        assert!(generator_system("", "", &modify, &snapshot()).contains("### File: Foo.cs"));
        assert!(!generator_system("", "", &create, &snapshot()).contains("### File: Foo.cs"));
    }

    #[test]
    fn merge_prompt_contains_both_versions() {
        let user = merge_user("Foo.cs", "old", "new");
        let existing = user.find("old").unwrap();
        let generated = user.find("new").unwrap();
        assert!(existing < generated);
    }
}
