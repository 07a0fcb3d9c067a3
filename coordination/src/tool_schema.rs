//! Tool schemas — the single named function a model is constrained to call.
//!
//! ```text
//! write_file  { FilePath: string, Content: string }   synthesis
//! merge_file  { FilePath: string, Content: string }   merge of old + new
//! plan_files  { Files: [{ FilePath, TaskId }] }        task splitting
//! ```
//!
//! Providers wrap the JSON-schema `parameters` differently; adapters only
//! read the three fields below.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FIELD_FILE_PATH: &str = "FilePath";
pub const FIELD_CONTENT: &str = "Content";
pub const FIELD_TASK_ID: &str = "TaskId";
pub const FIELD_FILES: &str = "Files";

pub const WRITE_FILE: &str = "write_file";
pub const MERGE_FILE: &str = "merge_file";
pub const PLAN_FILES: &str = "plan_files";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments.
    pub parameters: Value,
}

impl ToolSchema {
    /// Full replacement content for one file.
    pub fn write_file() -> Self {
        Self {
            name: WRITE_FILE.into(),
            description: "Write the complete content of one file. Always return the full file, \
                          never a diff or an excerpt."
                .into(),
            parameters: file_content_parameters(
                "Project-relative path of the file",
                "The complete file content",
            ),
        }
    }

    /// The merged result of an existing file and newly generated content.
    pub fn merge_file() -> Self {
        Self {
            name: MERGE_FILE.into(),
            description: "Return the complete merged content of one file, combining the intent \
                          of both the existing and the new version."
                .into(),
            parameters: file_content_parameters(
                "Project-relative path of the merged file",
                "The complete merged file content",
            ),
        }
    }

    /// Every file a task touches, tagged create or modify.
    pub fn plan_files() -> Self {
        Self {
            name: PLAN_FILES.into(),
            description: "List every file the task requires. TaskId 0 modifies an existing file, \
                          TaskId 1 creates a new file."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    FIELD_FILES: {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                FIELD_FILE_PATH: {
                                    "type": "string",
                                    "description": "Project-relative path of the file"
                                },
                                FIELD_TASK_ID: {
                                    "type": "integer",
                                    "description": "0 = modify an existing file, 1 = create a new file. No other value is accepted."
                                }
                            },
                            "required": [FIELD_FILE_PATH, FIELD_TASK_ID]
                        }
                    }
                },
                "required": [FIELD_FILES]
            }),
        }
    }

    /// Top-level required argument names.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

fn file_content_parameters(path_doc: &str, content_doc: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            FIELD_FILE_PATH: { "type": "string", "description": path_doc },
            FIELD_CONTENT: { "type": "string", "description": content_doc }
        },
        "required": [FIELD_FILE_PATH, FIELD_CONTENT]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_tools_require_path_and_content() {
        for tool in [ToolSchema::write_file(), ToolSchema::merge_file()] {
            assert_eq!(tool.required(), vec![FIELD_FILE_PATH, FIELD_CONTENT]);
        }
    }

    #[test]
    fn plan_tool_items_require_task_id() {
        let tool = ToolSchema::plan_files();
        assert_eq!(tool.name, PLAN_FILES);
        let item_required = &tool.parameters["properties"][FIELD_FILES]["items"]["required"];
        assert_eq!(item_required, &json!([FIELD_FILE_PATH, FIELD_TASK_ID]));
    }

    #[test]
    fn task_id_is_a_plain_integer() {
        // Some providers only accept `enum` on string properties.
        let tool = ToolSchema::plan_files();
        let task_id = &tool.parameters["properties"][FIELD_FILES]["items"]["properties"][FIELD_TASK_ID];
        assert_eq!(task_id["type"], "integer");
        assert!(task_id.get("enum").is_none());
    }
}
