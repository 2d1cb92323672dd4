use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
	#[error("Access denied - path outside allowed directories: {}", .0.display())]
	AccessDenied(PathBuf),

	#[error("Parent directory does not exist: {}", .0.display())]
	ParentMissing(PathBuf),

	#[error("Invalid arguments: {0}")]
	InvalidArguments(String),

	#[error("Could not find exact match for edit:\n{0}")]
	EditNotFound(String),

	#[error("Destination already exists: {}", .0.display())]
	AlreadyExists(PathBuf),

	#[error("Directory is not empty (use force to delete recursively): {}", .0.display())]
	NotEmpty(PathBuf),

	#[error("Not a directory: {}", .0.display())]
	NotADirectory(PathBuf),

	#[error("Is a directory: {}", .0.display())]
	IsADirectory(PathBuf),

	#[error("Failed to {action} {}: {source}", .path.display())]
	Io {
		action: &'static str,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl FsError {
	pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
		Self::Io {
			action,
			path: path.to_path_buf(),
			source
		}
	}

	pub fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidArguments(message.into())
	}

	/// Stable machine-readable code carried next to the human message.
	pub fn code(&self) -> &'static str {
		match self {
			FsError::AccessDenied(_) => "ACCESS_DENIED",
			FsError::ParentMissing(_) => "PARENT_MISSING",
			FsError::InvalidArguments(_) => "INVALID_ARGUMENTS",
			FsError::EditNotFound(_) => "EDIT_NOT_FOUND",
			FsError::AlreadyExists(_) => "ALREADY_EXISTS",
			FsError::NotEmpty(_) => "NOT_EMPTY",
			FsError::NotADirectory(_) => "NOT_A_DIRECTORY",
			FsError::IsADirectory(_) => "IS_A_DIRECTORY",
			FsError::Io { source, .. } => match source.kind() {
				std::io::ErrorKind::NotFound => "FILE_NOT_FOUND",
				std::io::ErrorKind::PermissionDenied => "PERMISSION_DENIED",
				std::io::ErrorKind::InvalidData => "INVALID_DATA",
				_ => "IO_ERROR",
			},
		}
	}
}

pub type Result<T> = std::result::Result<T, FsError>;
