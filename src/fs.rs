//! Sandboxed filesystem operations. Every path argument is validated before
//! the first filesystem effect.

use crate::edit::{self, Edit};
use crate::error::{FsError, Result};
use crate::sandbox::{absolute_normalized, AllowedRoots};
use crate::walk::{self, CopyReport};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
	pub diff: String,
	pub applied: bool,
}

pub async fn read_file(
	roots: &AllowedRoots,
	path: &str,
	head: Option<usize>,
	tail: Option<usize>) -> Result<String> {
	if head.is_some() && tail.is_some() {
		return Err(FsError::invalid("cannot specify both head and tail"));
	}
	let resolved = roots.validate(path).await?;
	let meta = fs::metadata(&resolved).await.map_err(|err| FsError::io("stat", &resolved, err))?;
	if meta.is_dir() {
		return Err(FsError::IsADirectory(resolved));
	}
	let content = fs::read_to_string(&resolved).await.map_err(|err| FsError::io("read", &resolved, err))?;
	if let Some(count) = head {
		return Ok(content.split_inclusive('\n').take(count).collect());
	}
	if let Some(count) = tail {
		let lines: Vec<&str> = content.split_inclusive('\n').collect();
		let skip = lines.len().saturating_sub(count);
		return Ok(lines[skip..].concat());
	}
	Ok(content)
}

/// Reads every path concurrently. A failing path becomes an error line in
/// the output instead of failing the batch.
pub async fn read_multiple_files(roots: &AllowedRoots, paths: &[String]) -> Result<String> {
	if paths.is_empty() {
		return Err(FsError::invalid("paths must contain at least one entry"));
	}
	let reads = paths.iter().map(
		|path| async move {
			match read_file(roots, path, None, None).await {
				Ok(content) => format!("{}:\n{}\n", path, content),
				Err(err) => format!("{}: Error - {}", path, err),
			}
		});
	Ok(join_all(reads).await.join("\n---\n"))
}

pub async fn write_file(roots: &AllowedRoots, path: &str, content: &str) -> Result<String> {
	let resolved = roots.validate(path).await?;
	if is_dir(&resolved).await {
		return Err(FsError::IsADirectory(resolved));
	}
	fs::write(&resolved, content).await.map_err(|err| FsError::io("write", &resolved, err))?;
	Ok(format!("Successfully wrote to {}", path))
}

pub async fn edit_file(
	roots: &AllowedRoots,
	path: &str,
	edits: &[Edit],
	dry_run: bool) -> Result<EditOutcome> {
	if edits.is_empty() {
		return Err(FsError::invalid("edits must contain at least one entry"));
	}
	let resolved = roots.validate(path).await?;
	let original = fs::read_to_string(&resolved).await.map_err(|err| FsError::io("read", &resolved, err))?;
	let modified = edit::apply_edits(&original, edits)?;
	let diff = edit::unified_diff(&original, &modified, &resolved.display().to_string());
	if !dry_run {
		fs::write(&resolved, &modified).await.map_err(|err| FsError::io("write", &resolved, err))?;
	}
	Ok(EditOutcome {
		diff: edit::fence_diff(&diff),
		applied: !dry_run
	})
}

pub async fn create_directory(roots: &AllowedRoots, path: &str) -> Result<String> {
	let resolved = roots.validate(path).await?;
	if let Ok(meta) = fs::metadata(&resolved).await {
		if !meta.is_dir() {
			return Err(FsError::NotADirectory(resolved));
		}
	}
	fs::create_dir_all(&resolved).await.map_err(|err| FsError::io("create directory", &resolved, err))?;
	Ok(format!("Successfully created directory {}", path))
}

pub async fn list_directory(roots: &AllowedRoots, path: &str) -> Result<String> {
	let resolved = roots.validate(path).await?;
	if !is_dir(&resolved).await {
		return Err(FsError::NotADirectory(resolved));
	}
	let mut entries = fs::read_dir(&resolved).await.map_err(|err| FsError::io("read directory", &resolved, err))?;
	let mut listed: Vec<(String, bool)> = Vec::new();
	while let Some(entry) = entries.next_entry().await.map_err(|err| FsError::io("read directory", &resolved, err))? {
		let is_dir = entry.file_type()
			.await
			.map(|kind| kind.is_dir())
			.unwrap_or(false);
		listed.push((entry.file_name().to_string_lossy().to_string(), is_dir));
	}
	listed.sort();
	Ok(
		listed.iter()
			.map(|(name, is_dir)| {
				let tag = if *is_dir {
					"[DIR]"
				}
				else {
					"[FILE]"
				};
				format!("{} {}", tag, name)
			})
			.collect::<Vec<_>>()
			.join("\n")
	)
}

pub async fn directory_tree(roots: &AllowedRoots, path: &str) -> Result<String> {
	let resolved = roots.validate(path).await?;
	if !is_dir(&resolved).await {
		return Err(FsError::NotADirectory(resolved));
	}
	let tree = walk::build_tree(roots, resolved.clone()).await?;
	serde_json::to_string_pretty(&tree).map_err(|err| FsError::io("render tree", &resolved, err.into()))
}

pub async fn move_file(roots: &AllowedRoots, source: &str, destination: &str) -> Result<String> {
	let from = roots.validate(source).await?;
	let to = roots.validate(destination).await?;
	if roots.is_root(&from) {
		return Err(FsError::AccessDenied(from));
	}
	if exists(&to).await {
		return Err(FsError::AlreadyExists(to));
	}
	match fs::rename(&from, &to).await {
		Ok(()) => {}
		Err(err) if is_cross_device(&err) => move_across_devices(roots, &from, &to).await?,
		Err(err) => return Err(FsError::io("move", &from, err)),
	}
	Ok(format!("Successfully moved {} to {}", source, destination))
}

async fn move_across_devices(roots: &AllowedRoots, from: &Path, to: &Path) -> Result<()> {
	if is_dir(from).await {
		let mut report = CopyReport::default();
		walk::copy_tree(roots, from.to_path_buf(), to.to_path_buf(), true, &mut report).await?;
		fs::remove_dir_all(from).await.map_err(|err| FsError::io("remove", from, err))?;
	}
	else {
		let mut warnings = Vec::new();
		walk::copy_file_preserving(from, to, &mut warnings).await?;
		fs::remove_file(from).await.map_err(|err| FsError::io("remove", from, err))?;
	}
	Ok(())
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
	err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &std::io::Error) -> bool {
	false
}

pub async fn search_files(
	roots: &AllowedRoots,
	path: &str,
	pattern: &str,
	exclude_patterns: &[String]) -> Result<String> {
	let resolved = roots.validate(path).await?;
	if !is_dir(&resolved).await {
		return Err(FsError::NotADirectory(resolved));
	}
	let matches = walk::search(roots, &resolved, pattern, exclude_patterns).await?;
	if matches.is_empty() {
		return Ok("No matches found".to_string());
	}
	Ok(
		matches.iter()
			.map(|path| path.display().to_string())
			.collect::<Vec<_>>()
			.join("\n")
	)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
	pub size: u64,
	pub created: String,
	pub modified: String,
	pub accessed: String,
	pub is_directory: bool,
	pub is_file: bool,
	pub permissions: String,
}

impl FileInfo {
	fn from_metadata(meta: &Metadata) -> Self {
		Self {
			size: meta.len(),
			created: format_time(meta.created()),
			modified: format_time(meta.modified()),
			accessed: format_time(meta.accessed()),
			is_directory: meta.is_dir(),
			is_file: meta.is_file(),
			permissions: permission_bits(meta)
		}
	}

	pub fn to_lines(&self) -> String {
		[
			format!("size: {}", self.size),
			format!("created: {}", self.created),
			format!("modified: {}", self.modified),
			format!("accessed: {}", self.accessed),
			format!("isDirectory: {}", self.is_directory),
			format!("isFile: {}", self.is_file),
			format!("permissions: {}", self.permissions),
		].join("\n")
	}
}

fn format_time(time: std::io::Result<SystemTime>) -> String {
	match time {
		Ok(time) => DateTime::<Utc>::from(time).to_rfc3339(),
		Err(_) => "unavailable".to_string(),
	}
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> String {
	use std::os::unix::fs::PermissionsExt;
	format!("{:03o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> String {
	if meta.permissions().readonly() {
		"444".to_string()
	}
	else {
		"666".to_string()
	}
}

pub async fn get_file_info(roots: &AllowedRoots, path: &str) -> Result<FileInfo> {
	let resolved = roots.validate(path).await?;
	let meta = fs::metadata(&resolved).await.map_err(|err| FsError::io("stat", &resolved, err))?;
	Ok(FileInfo::from_metadata(&meta))
}

pub async fn copy_file(roots: &AllowedRoots, source: &str, destination: &str) -> Result<String> {
	let from = roots.validate(source).await?;
	let to = roots.validate(destination).await?;
	let meta = fs::metadata(&from).await.map_err(|err| FsError::io("stat", &from, err))?;
	if meta.is_dir() {
		return Err(FsError::IsADirectory(from));
	}
	if exists(&to).await {
		return Err(FsError::AlreadyExists(to));
	}
	let mut warnings = Vec::new();
	walk::copy_file_preserving(&from, &to, &mut warnings).await?;
	Ok(with_warnings(format!("Successfully copied {} to {}", source, destination), &warnings))
}

pub async fn copy_directory(
	roots: &AllowedRoots,
	source: &str,
	destination: &str,
	recursive: bool) -> Result<String> {
	let from = roots.validate(source).await?;
	let to = roots.validate(destination).await?;
	if !is_dir(&from).await {
		return Err(FsError::NotADirectory(from));
	}
	if exists(&to).await {
		return Err(FsError::AlreadyExists(to));
	}
	if real_destination(&to).await?.starts_with(&from) {
		return Err(FsError::invalid(format!("cannot copy {} into itself", source)));
	}
	let mut report = CopyReport::default();
	walk::copy_tree(roots, from, to, recursive, &mut report).await?;
	let message = format!(
		"Successfully copied directory {} to {} ({} files, {} directories)",
		source,
		destination,
		report.files,
		report.directories
	);
	Ok(with_warnings(message, &report.warnings))
}

/// Where a not-yet-existing `path` will land once symlinks in its parent are
/// resolved.
async fn real_destination(path: &Path) -> Result<PathBuf> {
	let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
		return Ok(path.to_path_buf());
	};
	let parent = fs::canonicalize(parent).await.map_err(|err| FsError::io("resolve", parent, err))?;
	Ok(parent.join(name))
}

/// Removes a file, a symlink, or a directory. Non-empty directories need
/// `force`; allowed roots themselves are never removed.
pub async fn delete_file(roots: &AllowedRoots, path: &str, force: bool) -> Result<String> {
	let resolved = roots.validate(path).await?;
	let literal = absolute_normalized(Path::new(path))?;
	if roots.is_root(&literal) {
		return Err(FsError::AccessDenied(literal));
	}
	let link_meta = fs::symlink_metadata(&literal).await.map_err(|err| FsError::io("stat", &literal, err))?;
	if link_meta.file_type().is_symlink() {
		fs::remove_file(&literal).await.map_err(|err| FsError::io("delete", &literal, err))?;
		return Ok(format!("Successfully deleted {}", path));
	}
	if roots.is_root(&resolved) {
		return Err(FsError::AccessDenied(resolved));
	}
	if !link_meta.is_dir() {
		fs::remove_file(&resolved).await.map_err(|err| FsError::io("delete", &resolved, err))?;
		return Ok(format!("Successfully deleted {}", path));
	}
	let mut entries = fs::read_dir(&resolved).await.map_err(|err| FsError::io("read directory", &resolved, err))?;
	let empty = entries.next_entry()
		.await
		.map_err(|err| FsError::io("read directory", &resolved, err))?
		.is_none();
	if empty {
		fs::remove_dir(&resolved).await.map_err(|err| FsError::io("delete", &resolved, err))?;
	}
	else if force {
		fs::remove_dir_all(&resolved).await.map_err(|err| FsError::io("delete", &resolved, err))?;
	}
	else {
		return Err(FsError::NotEmpty(resolved));
	}
	Ok(format!("Successfully deleted {}", path))
}

pub fn list_allowed_directories(roots: &AllowedRoots) -> String {
	let mut out = String::from("Allowed directories:");
	for dir in roots.dirs() {
		out.push('\n');
		out.push_str(&dir.display().to_string());
	}
	out
}

fn with_warnings(message: String, warnings: &[String]) -> String {
	let mut out = message;
	for warning in warnings {
		out.push_str("\nWarning: ");
		out.push_str(warning);
	}
	out
}

async fn exists(path: &Path) -> bool {
	fs::symlink_metadata(path).await.is_ok()
}

async fn is_dir(path: &Path) -> bool {
	fs::metadata(path)
		.await
		.map(|meta| meta.is_dir())
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sandbox() -> (tempfile::TempDir, PathBuf, AllowedRoots) {
		let base = tempfile::tempdir().expect("tempdir");
		let root = base.path()
			.canonicalize()
			.expect("canonical base")
			.join("sandbox");
		std::fs::create_dir_all(&root).expect("root");
		let roots = AllowedRoots::from_dirs([&root]).expect("roots");
		(base, root, roots)
	}

	fn path_str(path: &Path) -> String {
		path.display().to_string()
	}

	#[tokio::test]
	async fn write_then_edit_scenario() {
		let (_base, root, roots) = sandbox();
		let file = path_str(&root.join("a.txt"));
		write_file(&roots, &file, "line1\nline2\n").await.expect("write");
		let outcome = edit_file(&roots, &file, &[Edit::new("line2", "LINE2")], false).await.expect("edit");
		assert!(outcome.applied);
		assert!(outcome.diff.starts_with("```diff\n"));
		assert!(outcome.diff.contains("-line2\n+LINE2\n"));
		assert_eq!(std::fs::read_to_string(root.join("a.txt")).expect("read"), "line1\nLINE2\n");
	}

	#[tokio::test]
	async fn dry_run_leaves_file_untouched() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("a.txt"), "keep\r\nme\r\n").expect("seed");
		let file = path_str(&root.join("a.txt"));
		let outcome = edit_file(&roots, &file, &[Edit::new("me", "you")], true).await.expect("dry run");
		assert!(!outcome.applied);
		assert!(outcome.diff.contains("+you"));
		assert_eq!(std::fs::read_to_string(root.join("a.txt")).expect("read"), "keep\r\nme\r\n");
	}

	#[tokio::test]
	async fn failed_edit_writes_nothing() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("a.txt"), "one\ntwo\n").expect("seed");
		let file = path_str(&root.join("a.txt"));
		let edits = [Edit::new("one", "ONE"), Edit::new("three", "THREE")];
		let err = edit_file(&roots, &file, &edits, false).await.expect_err("missing");
		assert!(matches!(err, FsError::EditNotFound(_)));
		assert_eq!(std::fs::read_to_string(root.join("a.txt")).expect("read"), "one\ntwo\n");
	}

	#[tokio::test]
	async fn read_head_and_tail() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("n.txt"), "1\n2\n3\n4\n").expect("seed");
		let file = path_str(&root.join("n.txt"));
		assert_eq!(read_file(&roots, &file, Some(2), None).await.expect("head"), "1\n2\n");
		assert_eq!(read_file(&roots, &file, None, Some(1)).await.expect("tail"), "4\n");
		let err = read_file(&roots, &file, Some(1), Some(1)).await.expect_err("both");
		assert!(matches!(err, FsError::InvalidArguments(_)));
	}

	#[tokio::test]
	async fn read_multiple_isolates_failures() {
		let (base, root, roots) = sandbox();
		std::fs::write(root.join("ok.txt"), "fine").expect("seed");
		let ok = path_str(&root.join("ok.txt"));
		let missing = path_str(&root.join("missing.txt"));
		let outside = path_str(&base.path().join("outside.txt"));
		let output = read_multiple_files(&roots, &[ok.clone(), missing.clone(), outside.clone()]).await.expect("batch");
		let parts: Vec<&str> = output.split("\n---\n").collect();
		assert_eq!(parts.len(), 3);
		assert_eq!(parts[0], format!("{}:\nfine\n", ok));
		assert!(parts[1].starts_with(&format!("{}: Error - ", missing)));
		assert!(parts[2].contains("Access denied"));
	}

	#[tokio::test]
	async fn create_directory_is_idempotent() {
		let (_base, root, roots) = sandbox();
		let dir = path_str(&root.join("made"));
		create_directory(&roots, &dir).await.expect("create");
		create_directory(&roots, &dir).await.expect("again");
		assert!(root.join("made").is_dir());
		std::fs::write(root.join("plain.txt"), "").expect("file");
		let err = create_directory(&roots, &path_str(&root.join("plain.txt"))).await.expect_err("file");
		assert!(matches!(err, FsError::NotADirectory(_)));
	}

	#[tokio::test]
	async fn list_directory_tags_entries() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("sub")).expect("sub");
		std::fs::write(root.join("file.txt"), "").expect("file");
		let listing = list_directory(&roots, &path_str(&root)).await.expect("list");
		assert_eq!(listing, "[FILE] file.txt\n[DIR] sub");
	}

	#[tokio::test]
	async fn directory_tree_renders_two_space_json() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("sub")).expect("sub");
		let tree = directory_tree(&roots, &path_str(&root)).await.expect("tree");
		assert_eq!(tree, "[\n  {\n    \"name\": \"sub\",\n    \"type\": \"directory\",\n    \"children\": []\n  }\n]");
	}

	#[tokio::test]
	async fn copy_and_move_reject_existing_destination() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("a.txt"), "a").expect("a");
		std::fs::write(root.join("b.txt"), "b").expect("b");
		std::fs::create_dir_all(root.join("d1")).expect("d1");
		std::fs::create_dir_all(root.join("d2")).expect("d2");
		let a = path_str(&root.join("a.txt"));
		let b = path_str(&root.join("b.txt"));
		let err = copy_file(&roots, &a, &b).await.expect_err("copy file");
		assert!(matches!(err, FsError::AlreadyExists(_)));
		let err = move_file(&roots, &a, &b).await.expect_err("move");
		assert!(matches!(err, FsError::AlreadyExists(_)));
		let err = copy_directory(&roots, &path_str(&root.join("d1")), &path_str(&root.join("d2")), true).await.expect_err("copy dir");
		assert!(matches!(err, FsError::AlreadyExists(_)));
		assert_eq!(std::fs::read_to_string(root.join("b.txt")).expect("b"), "b");
	}

	#[tokio::test]
	async fn copy_directory_into_itself_is_rejected() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("src")).expect("src");
		let err = copy_directory(&roots, &path_str(&root.join("src")), &path_str(&root.join("src/copy")), true)
			.await
			.expect_err("nested destination");
		assert!(matches!(err, FsError::InvalidArguments(_)));
		assert!(!root.join("src/copy").exists());
	}

	#[cfg(unix)]
	fn linked_sandbox() -> (tempfile::TempDir, PathBuf, AllowedRoots) {
		let base = tempfile::tempdir().expect("tempdir");
		let real = base.path().join("real");
		std::fs::create_dir_all(&real).expect("real");
		let link = base.path().join("link");
		std::os::unix::fs::symlink(&real, &link).expect("symlink");
		let roots = AllowedRoots::from_dirs([&link]).expect("roots");
		(base, link, roots)
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn copy_into_itself_through_symlinked_root_is_rejected() {
		let (_base, link, roots) = linked_sandbox();
		std::fs::create_dir_all(link.join("src")).expect("src");
		std::fs::write(link.join("src/a.txt"), "a").expect("a");
		let err = copy_directory(&roots, &path_str(&link.join("src")), &path_str(&link.join("src/copy")), true)
			.await
			.expect_err("nested destination");
		assert!(matches!(err, FsError::InvalidArguments(_)));
		assert!(!link.join("src/copy").exists());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn copy_into_itself_through_alias_is_rejected() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("src")).expect("src");
		std::os::unix::fs::symlink(root.join("src"), root.join("alias")).expect("alias");
		let err = copy_directory(&roots, &path_str(&root.join("src")), &path_str(&root.join("alias/copy")), true)
			.await
			.expect_err("aliased destination");
		assert!(matches!(err, FsError::InvalidArguments(_)));
		assert!(!root.join("src/copy").exists());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn delete_refuses_root_configured_through_symlink() {
		let (_base, link, roots) = linked_sandbox();
		let err = delete_file(&roots, &path_str(&link), true).await.expect_err("root link");
		assert!(matches!(err, FsError::AccessDenied(_)));
		assert!(std::fs::symlink_metadata(&link).is_ok());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn delete_removes_link_to_root_not_root() {
		let (_base, root, roots) = sandbox();
		std::os::unix::fs::symlink(&root, root.join("self")).expect("symlink");
		delete_file(&roots, &path_str(&root.join("self")), false).await.expect("delete link");
		assert!(std::fs::symlink_metadata(root.join("self")).is_err());
		assert!(root.is_dir());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn copies_keep_permission_bits() {
		use std::os::unix::fs::PermissionsExt;
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("src")).expect("src");
		let file = root.join("src/secret.txt");
		std::fs::write(&file, "s").expect("seed");
		std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o640)).expect("chmod");
		let message = copy_file(&roots, &path_str(&file), &path_str(&root.join("single.txt"))).await.expect("copy file");
		assert!(!message.contains("Warning:"));
		copy_directory(&roots, &path_str(&root.join("src")), &path_str(&root.join("dst")), true).await.expect("copy dir");
		for copied in [root.join("single.txt"), root.join("dst/secret.txt")] {
			let mode = std::fs::metadata(&copied).expect("meta").permissions().mode();
			assert_eq!(mode & 0o777, 0o640);
		}
	}

	#[test]
	fn warnings_are_appended_to_message() {
		let warnings = vec!["could not restore timestamps on /x: denied".to_string()];
		assert_eq!(
			with_warnings("Successfully copied a to b".to_string(), &warnings),
			"Successfully copied a to b\nWarning: could not restore timestamps on /x: denied"
		);
		assert_eq!(with_warnings("done".to_string(), &[]), "done");
	}

	#[tokio::test]
	async fn copy_file_rejects_directory_source() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("dir")).expect("dir");
		let err = copy_file(&roots, &path_str(&root.join("dir")), &path_str(&root.join("copy"))).await.expect_err("dir source");
		assert!(matches!(err, FsError::IsADirectory(_)));
	}

	#[tokio::test]
	async fn move_renames_file() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("from.txt"), "data").expect("from");
		move_file(&roots, &path_str(&root.join("from.txt")), &path_str(&root.join("to.txt"))).await.expect("move");
		assert!(!root.join("from.txt").exists());
		assert_eq!(std::fs::read_to_string(root.join("to.txt")).expect("to"), "data");
	}

	#[tokio::test]
	async fn delete_requires_force_for_non_empty_directory() {
		let (_base, root, roots) = sandbox();
		std::fs::create_dir_all(root.join("full/inner")).expect("full");
		std::fs::write(root.join("full/inner/f.txt"), "x").expect("file");
		let full = path_str(&root.join("full"));
		let err = delete_file(&roots, &full, false).await.expect_err("not empty");
		assert!(matches!(err, FsError::NotEmpty(_)));
		assert!(root.join("full/inner/f.txt").exists());
		delete_file(&roots, &full, true).await.expect("forced");
		assert!(!root.join("full").exists());
	}

	#[tokio::test]
	async fn delete_refuses_allowed_root() {
		let (_base, root, roots) = sandbox();
		let err = delete_file(&roots, &path_str(&root), true).await.expect_err("root");
		assert!(matches!(err, FsError::AccessDenied(_)));
		assert!(root.exists());
	}

	#[tokio::test]
	async fn operations_outside_sandbox_touch_nothing() {
		let (base, _root, roots) = sandbox();
		let outside = base.path().join("outside.txt");
		let err = write_file(&roots, &path_str(&outside), "x").await.expect_err("write outside");
		assert!(matches!(err, FsError::AccessDenied(_)));
		assert!(!outside.exists());
	}

	#[tokio::test]
	async fn file_info_lists_fields() {
		let (_base, root, roots) = sandbox();
		std::fs::write(root.join("info.txt"), "12345").expect("seed");
		let info = get_file_info(&roots, &path_str(&root.join("info.txt"))).await.expect("info");
		assert_eq!(info.size, 5);
		assert!(info.is_file);
		assert_eq!(info.permissions.len(), 3);
		let lines = info.to_lines();
		assert!(lines.contains("size: 5\n"));
		assert!(lines.contains("isDirectory: false\n"));
		assert!(lines.ends_with(&format!("permissions: {}", info.permissions)));
	}

	#[tokio::test]
	async fn search_files_reports_no_matches() {
		let (_base, root, roots) = sandbox();
		let output = search_files(&roots, &path_str(&root), "nothing", &[]).await.expect("search");
		assert_eq!(output, "No matches found");
	}

	#[test]
	fn allowed_directories_listing() {
		let (_base, root, roots) = sandbox();
		assert_eq!(list_allowed_directories(&roots), format!("Allowed directories:\n{}", root.display()));
	}
}
