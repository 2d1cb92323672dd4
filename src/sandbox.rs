//! Path sandbox: every path argument passes through [`AllowedRoots::validate`]
//! before the filesystem is touched.
//!
//! Containment is a prefix test on normalized absolute paths, evaluated per
//! path component, so a root `/data` admits `/data` and `/data/x` but not
//! `/data-other`.

use crate::error::{FsError, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Debug)]
struct AllowedRoot {
	path: PathBuf,
	real: PathBuf,
}

/// The configured sandbox boundary. Built once at startup and never mutated.
#[derive(Clone, Debug)]
pub struct AllowedRoots {
	roots: Vec<AllowedRoot>,
}

impl AllowedRoots {
	/// Resolves the configured directories. Each one must exist and be a directory.
	pub fn from_dirs<I, P>(dirs: I) -> Result<Self>
	where
		I: IntoIterator<Item = P>,
		P: AsRef<Path>, {
		let mut roots: Vec<AllowedRoot> = Vec::new();
		for dir in dirs {
			let path = absolute_normalized(dir.as_ref())?;
			let meta = std::fs::metadata(&path).map_err(|err| FsError::io("access allowed directory", &path, err))?;
			if !meta.is_dir() {
				return Err(FsError::NotADirectory(path));
			}
			let real = std::fs::canonicalize(&path)
				.map(|real| normalize_path(&real))
				.map_err(|err| FsError::io("resolve allowed directory", &path, err))?;
			if roots.iter().any(|root| root.path == path) {
				continue;
			}
			roots.push(AllowedRoot {
				path,
				real
			});
		}
		if roots.is_empty() {
			return Err(FsError::invalid("at least one allowed directory is required"));
		}
		Ok(Self {
			roots
		})
	}

	pub fn dirs(&self) -> impl Iterator<Item = &Path> {
		self.roots
			.iter()
			.map(|root| root.path.as_path())
	}

	pub fn contains(&self, path: &Path) -> bool {
		self.roots
			.iter()
			.any(|root| path.starts_with(&root.path) || path.starts_with(&root.real))
	}

	pub fn is_root(&self, path: &Path) -> bool {
		self.roots
			.iter()
			.any(|root| path == root.path || path == root.real)
	}

	/// Returns the real path for existing targets, or the normalized literal
	/// path when only the parent exists.
	pub async fn validate(&self, requested: impl AsRef<Path>) -> Result<PathBuf> {
		let absolute = self.check_literal(requested.as_ref())?;
		match tokio::fs::canonicalize(&absolute).await {
			Ok(real) => self.check_real(real),
			Err(_) => {
				let parent = parent_of(&absolute)?;
				let real_parent = tokio::fs::canonicalize(&parent)
					.await
					.map_err(|_| FsError::ParentMissing(parent.clone()))?;
				let link_target = tokio::fs::read_link(&absolute).await.ok();
				self.check_new_leaf(absolute, real_parent, link_target)
			}
		}
	}

	/// Same checks as [`AllowedRoots::validate`] for callers already on a blocking thread.
	pub fn validate_blocking(&self, requested: impl AsRef<Path>) -> Result<PathBuf> {
		let absolute = self.check_literal(requested.as_ref())?;
		match std::fs::canonicalize(&absolute) {
			Ok(real) => self.check_real(real),
			Err(_) => {
				let parent = parent_of(&absolute)?;
				let real_parent = std::fs::canonicalize(&parent).map_err(|_| FsError::ParentMissing(parent.clone()))?;
				let link_target = std::fs::read_link(&absolute).ok();
				self.check_new_leaf(absolute, real_parent, link_target)
			}
		}
	}

	fn check_literal(&self, requested: &Path) -> Result<PathBuf> {
		let absolute = absolute_normalized(requested)?;
		if !self.contains(&absolute) {
			return Err(FsError::AccessDenied(absolute));
		}
		Ok(absolute)
	}

	fn check_real(&self, real: PathBuf) -> Result<PathBuf> {
		let real = normalize_path(&real);
		if !self.contains(&real) {
			return Err(FsError::AccessDenied(real));
		}
		Ok(real)
	}

	fn check_new_leaf(
		&self,
		absolute: PathBuf,
		real_parent: PathBuf,
		link_target: Option<PathBuf>) -> Result<PathBuf> {
		let real_parent = normalize_path(&real_parent);
		if !self.contains(&real_parent) {
			return Err(FsError::AccessDenied(real_parent));
		}
		// A dangling symlink would let a later write land wherever it points.
		if let Some(target) = link_target {
			let target = normalize_path(&real_parent.join(target));
			if !self.contains(&target) {
				return Err(FsError::AccessDenied(target));
			}
		}
		Ok(absolute)
	}
}

fn parent_of(path: &Path) -> Result<PathBuf> {
	path.parent()
		.map(Path::to_path_buf)
		.ok_or_else(|| FsError::ParentMissing(path.to_path_buf()))
}

/// Expands a leading `~` component to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
	if let Ok(rest) = path.strip_prefix("~") {
		if let Some(home) = dirs::home_dir() {
			if rest.as_os_str().is_empty() {
				return home;
			}
			return home.join(rest);
		}
	}
	path.to_path_buf()
}

pub fn absolute_normalized(path: &Path) -> Result<PathBuf> {
	let expanded = expand_home(path);
	let absolute = if expanded.is_absolute() {
		expanded
	}
	else {
		let cwd = std::env::current_dir().map_err(|err| FsError::io("resolve", &expanded, err))?;
		cwd.join(expanded)
	};
	Ok(normalize_path(&absolute))
}

/// Lexical normalization: drops `.`, folds `..` and redundant separators.
pub fn normalize_path(path: &Path) -> PathBuf {
	let mut stack: Vec<OsString> = Vec::new();
	let mut prefix: Option<OsString> = None;
	let mut absolute = false;
	for component in path.components() {
		match component {
			Component::Prefix(prefix_component) => {
				prefix = Some(prefix_component.as_os_str().to_os_string());
			}
			Component::RootDir => {
				absolute = true;
				stack.clear();
			}
			Component::CurDir => {}
			Component::ParentDir => {
				if stack.last().map(|last| last != "..").unwrap_or(false) {
					stack.pop();
				}
				else if !absolute {
					stack.push(OsString::from(".."));
				}
			}
			Component::Normal(part) => stack.push(part.to_os_string()),
		}
	}
	let mut out = PathBuf::new();
	if let Some(prefix) = prefix {
		out.push(prefix);
	}
	if absolute {
		out.push(Component::RootDir.as_os_str());
	}
	for part in stack {
		out.push(part);
	}
	out
}
