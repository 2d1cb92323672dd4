use crate::error::{FsError, Result};
use crate::sandbox::AllowedRoots;
use filetime::{set_file_times, FileTime};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::Metadata;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	File,
	Directory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: NodeKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
	pub fn file(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: NodeKind::File,
			children: None
		}
	}

	pub fn directory(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
		Self {
			name: name.into(),
			kind: NodeKind::Directory,
			children: Some(children)
		}
	}
}

/// Depth-first name search below `root`.
///
/// Entries that fail validation or match an exclude pattern are dropped
/// together with everything beneath them. Symlinks are never followed.
pub async fn search(
	roots: &AllowedRoots,
	root: &Path,
	pattern: &str,
	exclude_patterns: &[String]) -> Result<Vec<PathBuf>> {
	let excludes = build_exclude_set(exclude_patterns)?;
	let roots = Arc::new(roots.clone());
	let root_owned = root.to_path_buf();
	let needle = pattern.to_lowercase();
	tokio::task::spawn_blocking(move || search_blocking(roots, root_owned, &needle, excludes))
		.await
		.map_err(|err| FsError::io("search", root, std::io::Error::other(err)))
}

fn search_blocking(
	roots: Arc<AllowedRoots>,
	root: PathBuf,
	needle: &str,
	excludes: Option<GlobSet>) -> Vec<PathBuf> {
	let mut builder = WalkBuilder::new(&root);
	builder.standard_filters(false);
	builder.hidden(false);
	builder.follow_links(false);
	builder.sort_by_file_name(|a, b| a.cmp(b));
	let filter_root = root.clone();
	builder.filter_entry(
		move |entry| {
			if entry.depth() == 0 {
				return true;
			}
			if let Err(err) = roots.validate_blocking(entry.path()) {
				debug!(path = %entry.path().display(), error = %err, "search skipped entry");
				return false;
			}
			match &excludes {
				Some(excludes) => !excludes.is_match(relative_display(&filter_root, entry.path())),
				None => true,
			}
		}
	);
	let mut matches = Vec::new();
	for entry in builder.build() {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				debug!(error = %err, "search could not read entry");
				continue;
			}
		};
		if entry.depth() == 0 {
			continue;
		}
		let name = entry.file_name()
			.to_string_lossy()
			.to_lowercase();
		if name.contains(needle) {
			matches.push(entry.into_path());
		}
	}
	matches
}

/// Patterns without `*` name a path segment: the segment and all of its
/// descendants are excluded.
pub fn build_exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let globs = if pattern.contains('*') {
			vec![pattern.clone()]
		}
		else {
			vec![format!("**/{}", pattern), format!("**/{}/**", pattern)]
		};
		for glob in globs {
			let glob = GlobBuilder::new(&glob)
				.literal_separator(true)
				.build()
				.map_err(|err| FsError::invalid(format!("invalid exclude pattern {}: {}", pattern, err)))?;
			builder.add(glob);
		}
	}
	let set = builder.build().map_err(|err| FsError::invalid(format!("invalid exclude patterns: {}", err)))?;
	Ok(Some(set))
}

fn relative_display(root: &Path, path: &Path) -> String {
	if let Ok(rel) = path.strip_prefix(root) {
		return rel.to_string_lossy().to_string();
	}
	path.to_string_lossy().to_string()
}

/// Children of `dir`, sorted by name. Entries outside the sandbox are left out.
pub fn build_tree<'a>(roots: &'a AllowedRoots, dir: PathBuf) -> BoxFuture<'a, Result<Vec<TreeNode>>> {
	Box::pin(
		async move {
			let mut entries = fs::read_dir(&dir).await.map_err(|err| FsError::io("read directory", &dir, err))?;
			let mut listed = Vec::new();
			while let Some(entry) = entries.next_entry().await.map_err(|err| FsError::io("read directory", &dir, err))? {
				listed.push(entry);
			}
			listed.sort_by_key(|entry| entry.file_name());
			let mut nodes = Vec::with_capacity(listed.len());
			for entry in listed {
				let path = entry.path();
				if let Err(err) = roots.validate(&path).await {
					debug!(path = %path.display(), error = %err, "tree skipped entry");
					continue;
				}
				let name = entry.file_name()
					.to_string_lossy()
					.to_string();
				let is_dir = entry.file_type()
					.await
					.map(|kind| kind.is_dir())
					.unwrap_or(false);
				if is_dir {
					let children = build_tree(roots, path).await?;
					nodes.push(TreeNode::directory(name, children));
				}
				else {
					nodes.push(TreeNode::file(name));
				}
			}
			Ok(nodes)
		}
	)
}

#[derive(Debug, Default)]
pub struct CopyReport {
	pub files: usize,
	pub directories: usize,
	pub warnings: Vec<String>,
	visited: HashSet<PathBuf>,
}

/// Copies one file and carries over its timestamps and permission bits.
/// Failing to restore either only adds a warning.
pub async fn copy_file_preserving(from: &Path, to: &Path, warnings: &mut Vec<String>) -> Result<()> {
	fs::copy(from, to).await.map_err(|err| FsError::io("copy", from, err))?;
	let meta = fs::metadata(from).await.map_err(|err| FsError::io("stat", from, err))?;
	restore_metadata(to, &meta, warnings).await;
	Ok(())
}

async fn restore_metadata(to: &Path, meta: &Metadata, warnings: &mut Vec<String>) {
	let atime = FileTime::from_last_access_time(meta);
	let mtime = FileTime::from_last_modification_time(meta);
	if let Err(err) = set_file_times(to, atime, mtime) {
		warn!(path = %to.display(), error = %err, "could not restore timestamps");
		warnings.push(format!("could not restore timestamps on {}: {}", to.display(), err));
	}
	if let Err(err) = fs::set_permissions(to, meta.permissions()).await {
		warn!(path = %to.display(), error = %err, "could not restore permissions");
		warnings.push(format!("could not restore permissions on {}: {}", to.display(), err));
	}
}

/// Copies the directory `from` to `to`. Without `recursive` only the direct
/// file entries are copied.
pub fn copy_tree<'a>(
	roots: &'a AllowedRoots,
	from: PathBuf,
	to: PathBuf,
	recursive: bool,
	report: &'a mut CopyReport) -> BoxFuture<'a, Result<()>> {
	Box::pin(
		async move {
			let real = fs::canonicalize(&from).await.map_err(|err| FsError::io("resolve", &from, err))?;
			if !report.visited.insert(real) {
				warn!(path = %from.display(), "copy skipped directory already visited");
				report.warnings.push(format!("skipped {}: directory already visited", from.display()));
				return Ok(());
			}
			fs::create_dir_all(&to).await.map_err(|err| FsError::io("create directory", &to, err))?;
			report.directories += 1;
			// The copy itself must never be walked as part of the source.
			let real_to = fs::canonicalize(&to).await.map_err(|err| FsError::io("resolve", &to, err))?;
			report.visited.insert(real_to);
			let mut entries = fs::read_dir(&from).await.map_err(|err| FsError::io("read directory", &from, err))?;
			while let Some(entry) = entries.next_entry().await.map_err(|err| FsError::io("read directory", &from, err))? {
				let src = match roots.validate(entry.path()).await {
					Ok(src) => src,
					Err(err) => {
						warn!(path = %entry.path().display(), error = %err, "copy skipped entry");
						report.warnings.push(format!("skipped {}: {}", entry.path().display(), err));
						continue;
					}
				};
				let dst = to.join(entry.file_name());
				let meta = fs::metadata(&src).await.map_err(|err| FsError::io("stat", &src, err))?;
				if meta.is_dir() {
					if recursive {
						copy_tree(roots, src, dst, recursive, report).await?;
					}
					else {
						report.warnings.push(format!("skipped subdirectory {} (recursive copy disabled)", entry.path().display()));
					}
				}
				else {
					copy_file_preserving(&src, &dst, &mut report.warnings).await?;
					report.files += 1;
				}
			}
			let meta = fs::metadata(&from).await.map_err(|err| FsError::io("stat", &from, err))?;
			restore_metadata(&to, &meta, &mut report.warnings).await;
			Ok(())
		}
	)
}
