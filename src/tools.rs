//! Tool table: argument decoding, dispatch into [`crate::fs`], and the
//! success/error envelope every call result carries.

use crate::edit::Edit;
use crate::error::{FsError, Result};
use crate::fs;
use crate::sandbox::AllowedRoots;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub const TOOL_NAMES: [&str; 14] = [
	"read_file",
	"read_multiple_files",
	"write_file",
	"edit_file",
	"create_directory",
	"list_directory",
	"directory_tree",
	"move_file",
	"search_files",
	"get_file_info",
	"copy_file",
	"copy_directory",
	"delete_file",
	"list_allowed_directories",
];

#[derive(Deserialize)]
struct PathArgs {
	path: String,
}

#[derive(Deserialize)]
struct ReadFileArgs {
	path: String,
	#[serde(default)]
	head: Option<usize>,
	#[serde(default)]
	tail: Option<usize>,
}

#[derive(Deserialize)]
struct ReadMultipleArgs {
	paths: Vec<String>,
}

#[derive(Deserialize)]
struct WriteArgs {
	path: String,
	content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditArgs {
	path: String,
	edits: Vec<Edit>,
	#[serde(default)]
	dry_run: bool,
}

#[derive(Deserialize)]
struct TransferArgs {
	source: String,
	destination: String,
}

#[derive(Deserialize)]
struct CopyDirectoryArgs {
	source: String,
	destination: String,
	#[serde(default = "default_recursive")]
	recursive: bool,
}

fn default_recursive() -> bool {
	true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
	path: String,
	pattern: String,
	#[serde(default)]
	exclude_patterns: Vec<String>,
}

#[derive(Deserialize)]
struct DeleteArgs {
	path: String,
	#[serde(default)]
	force: bool,
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
	serde_json::from_value(arguments).map_err(|err| FsError::invalid(err.to_string()))
}

pub fn is_known(name: &str) -> bool {
	TOOL_NAMES.contains(&name)
}

/// Runs one tool. Unknown names are reported as invalid arguments; the
/// server checks [`is_known`] first to answer them at the protocol level.
pub async fn execute_tool(roots: &AllowedRoots, name: &str, arguments: Value) -> Result<String> {
	match name {
		"read_file" => {
			let args: ReadFileArgs = parse_args(arguments)?;
			fs::read_file(roots, &args.path, args.head, args.tail).await
		}
		"read_multiple_files" => {
			let args: ReadMultipleArgs = parse_args(arguments)?;
			fs::read_multiple_files(roots, &args.paths).await
		}
		"write_file" => {
			let args: WriteArgs = parse_args(arguments)?;
			fs::write_file(roots, &args.path, &args.content).await
		}
		"edit_file" => {
			let args: EditArgs = parse_args(arguments)?;
			let outcome = fs::edit_file(roots, &args.path, &args.edits, args.dry_run).await?;
			Ok(outcome.diff)
		}
		"create_directory" => {
			let args: PathArgs = parse_args(arguments)?;
			fs::create_directory(roots, &args.path).await
		}
		"list_directory" => {
			let args: PathArgs = parse_args(arguments)?;
			fs::list_directory(roots, &args.path).await
		}
		"directory_tree" => {
			let args: PathArgs = parse_args(arguments)?;
			fs::directory_tree(roots, &args.path).await
		}
		"move_file" => {
			let args: TransferArgs = parse_args(arguments)?;
			fs::move_file(roots, &args.source, &args.destination).await
		}
		"search_files" => {
			let args: SearchArgs = parse_args(arguments)?;
			fs::search_files(roots, &args.path, &args.pattern, &args.exclude_patterns).await
		}
		"get_file_info" => {
			let args: PathArgs = parse_args(arguments)?;
			let info = fs::get_file_info(roots, &args.path).await?;
			Ok(info.to_lines())
		}
		"copy_file" => {
			let args: TransferArgs = parse_args(arguments)?;
			fs::copy_file(roots, &args.source, &args.destination).await
		}
		"copy_directory" => {
			let args: CopyDirectoryArgs = parse_args(arguments)?;
			fs::copy_directory(roots, &args.source, &args.destination, args.recursive).await
		}
		"delete_file" => {
			let args: DeleteArgs = parse_args(arguments)?;
			fs::delete_file(roots, &args.path, args.force).await
		}
		"list_allowed_directories" => Ok(fs::list_allowed_directories(roots)),
		_ => Err(FsError::invalid(format!("unknown tool: {}", name))),
	}
}

pub fn tool_success(text: String) -> Value {
	json!({
		"content": [
			{
				"type": "text",
				"text": text
			}
		],
		"isError": false
	})
}

pub fn tool_error(err: &FsError) -> Value {
	json!({
		"isError": true,
		"structuredContent": {
			"code": err.code()
		},
		"content": [
			{
				"type": "text",
				"text": format!("Error: {}", err)
			}
		]
	})
}

fn path_schema(description: &str) -> Value {
	json!({
		"type": "object",
		"properties": {
			"path": { "type": "string", "description": description }
		},
		"required": ["path"],
		"additionalProperties": false
	})
}

fn transfer_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"source": { "type": "string", "description": "Existing path inside an allowed directory." },
			"destination": { "type": "string", "description": "Target path; must not exist yet." }
		},
		"required": ["source", "destination"],
		"additionalProperties": false
	})
}

pub fn tool_definitions() -> Vec<Value> {
	vec![
	json!({
		"name": "read_file",
		"description": "Read a UTF-8 text file. Optionally return only the first (head) or last (tail) N lines.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string" },
				"head": { "type": "integer", "minimum": 0, "description": "Return only the first N lines." },
				"tail": { "type": "integer", "minimum": 0, "description": "Return only the last N lines." }
			},
			"required": ["path"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "read_multiple_files",
		"description": "Read several files at once. A failing path is reported inline and does not stop the others.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"paths": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
			},
			"required": ["paths"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "write_file",
		"description": "Create a file or overwrite an existing one with the given content.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string" },
				"content": { "type": "string" }
			},
			"required": ["path", "content"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "edit_file",
		"description": "Apply ordered search/replace edits to a text file. Each oldText must match exactly or line-by-line ignoring surrounding whitespace. Returns a unified diff; dryRun previews without writing.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string" },
				"edits": {
					"type": "array",
					"minItems": 1,
					"items": {
						"type": "object",
						"properties": {
							"oldText": { "type": "string", "description": "Text to search for." },
							"newText": { "type": "string", "description": "Replacement text." }
						},
						"required": ["oldText", "newText"],
						"additionalProperties": false
					}
				},
				"dryRun": { "type": "boolean", "default": false }
			},
			"required": ["path", "edits"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "create_directory",
		"description": "Create a directory. Succeeds silently if it already exists.",
		"inputSchema": path_schema("Directory to create; its parent must exist.")
	}),
	json!({
		"name": "list_directory",
		"description": "List a directory, one entry per line prefixed with [DIR] or [FILE].",
		"inputSchema": path_schema("Directory to list.")
	}),
	json!({
		"name": "directory_tree",
		"description": "Recursive JSON tree of a directory. Each node has name, type, and children for directories.",
		"inputSchema": path_schema("Directory to describe.")
	}),
	json!({
		"name": "move_file",
		"description": "Move or rename a file or directory. Fails if the destination exists.",
		"inputSchema": transfer_schema()
	}),
	json!({
		"name": "search_files",
		"description": "Recursively find entries whose name contains pattern (case-insensitive). excludePatterns are globs matched against paths relative to path.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string" },
				"pattern": { "type": "string" },
				"excludePatterns": { "type": "array", "items": { "type": "string" }, "default": [] }
			},
			"required": ["path", "pattern"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "get_file_info",
		"description": "Size, timestamps, type and permission bits of a file or directory.",
		"inputSchema": path_schema("File or directory to inspect.")
	}),
	json!({
		"name": "copy_file",
		"description": "Copy a file, keeping timestamps and permissions. Fails if the destination exists.",
		"inputSchema": transfer_schema()
	}),
	json!({
		"name": "copy_directory",
		"description": "Copy a directory, keeping timestamps and permissions. Fails if the destination exists. With recursive false only the top-level files are copied.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"source": { "type": "string" },
				"destination": { "type": "string" },
				"recursive": { "type": "boolean", "default": true }
			},
			"required": ["source", "destination"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "delete_file",
		"description": "Delete a file or directory. Non-empty directories require force.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string" },
				"force": { "type": "boolean", "default": false }
			},
			"required": ["path"],
			"additionalProperties": false
		}
	}),
	json!({
		"name": "list_allowed_directories",
		"description": "List the directories this server may access.",
		"inputSchema": {
			"type": "object",
			"properties": {},
			"additionalProperties": false
		}
	}),
	]
}
