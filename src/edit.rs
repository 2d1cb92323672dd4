//! Search/replace edits with a whitespace-tolerant fallback, rendered as a
//! fenced unified diff.

use crate::error::{FsError, Result};
use serde::Deserialize;
use similar::TextDiff;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
	pub old_text: String,
	pub new_text: String,
}

impl Edit {
	pub fn new(old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
		Self {
			old_text: old_text.into(),
			new_text: new_text.into()
		}
	}
}

pub fn normalize_line_endings(text: &str) -> String {
	text.replace("\r\n", "\n")
}

/// Applies `edits` in order, each to the output of the previous one.
///
/// Fails on the first edit that matches neither verbatim nor line-by-line
/// after trimming; nothing from that edit onward is applied.
pub fn apply_edits(content: &str, edits: &[Edit]) -> Result<String> {
	edits.iter()
		.try_fold(normalize_line_endings(content), |buffer, edit| apply_edit(&buffer, edit))
}

fn apply_edit(buffer: &str, edit: &Edit) -> Result<String> {
	let old_text = normalize_line_endings(&edit.old_text);
	let new_text = normalize_line_endings(&edit.new_text);
	if buffer.contains(&old_text) {
		return Ok(buffer.replacen(&old_text, &new_text, 1));
	}
	replace_line_block(buffer, &old_text, &new_text).ok_or_else(|| FsError::EditNotFound(edit.old_text.clone()))
}

fn replace_line_block(buffer: &str, old_text: &str, new_text: &str) -> Option<String> {
	let mut lines: Vec<String> = buffer.split('\n')
		.map(str::to_string)
		.collect();
	let old_lines: Vec<&str> = old_text.split('\n').collect();
	if old_lines.len() > lines.len() {
		return None;
	}
	let start = (0..=lines.len() - old_lines.len()).find(
		|&start| {
			old_lines.iter()
				.zip(&lines[start..])
				.all(|(old, line)| old.trim() == line.trim())
		})?;
	let indent = leading_whitespace(&lines[start]).to_string();
	let replacement: Vec<String> = new_text.split('\n')
		.enumerate()
		.map(|(index, line)| reindent_line(index, line, &indent, &old_lines))
		.collect();
	lines.splice(start..start + old_lines.len(), replacement);
	Some(lines.join("\n"))
}

fn reindent_line(index: usize, line: &str, indent: &str, old_lines: &[&str]) -> String {
	if index == 0 {
		return format!("{}{}", indent, line.trim_start());
	}
	let old_indent = old_lines.get(index)
		.map(|old| leading_whitespace(old))
		.unwrap_or("");
	let new_indent = leading_whitespace(line);
	if old_indent.is_empty() || new_indent.is_empty() {
		return line.to_string();
	}
	let extra = new_indent.len().saturating_sub(old_indent.len());
	format!("{}{}{}", indent, " ".repeat(extra), line.trim_start())
}

fn leading_whitespace(line: &str) -> &str {
	let end = line.char_indices()
		.find(|(_, ch)| !ch.is_whitespace())
		.map(|(index, _)| index)
		.unwrap_or(line.len());
	&line[..end]
}

pub fn unified_diff(original: &str, modified: &str, label: &str) -> String {
	let original = normalize_line_endings(original);
	let modified = normalize_line_endings(modified);
	let diff = TextDiff::from_lines(&original, &modified);
	let body = diff.unified_diff()
		.context_radius(3)
		.header(&format!("{}\toriginal", label), &format!("{}\tmodified", label))
		.to_string();
	format!("Index: {}\n{}\n{}", label, "=".repeat(67), body)
}

/// Wraps `diff` in a backtick fence longer than any backtick run it contains.
pub fn fence_diff(diff: &str) -> String {
	let mut ticks = 3;
	while diff.contains(&"`".repeat(ticks)) {
		ticks += 1;
	}
	let fence = "`".repeat(ticks);
	let newline = if diff.ends_with('\n') {
		""
	}
	else {
		"\n"
	};
	format!("{}diff\n{}{}{}\n\n", fence, diff, newline, fence)
}
