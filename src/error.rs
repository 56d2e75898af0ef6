//! Error taxonomy for the store and watcher.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::identity::{GroupKind, ObjectId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
	/// A mapping lookup found no entry for the given identity. Distinct from
	/// the identity being syntactically invalid.
	#[error("untracked object: {0}")]
	NotTracked(ObjectId),

	/// A mapping lookup found no entry for the given path.
	#[error("untracked path: '{}'", .0.display())]
	NotTrackedPath(PathBuf),

	/// A namespace-scoped query or mapping contradicted the kind's declared
	/// scope (empty namespace for a namespaced kind, or the reverse).
	#[error(
		"namespace scope mismatch for {group_kind}: got namespace {namespace:?}"
	)]
	NamespaceScopeMismatch {
		group_kind: GroupKind,
		namespace: Option<String>,
	},

	/// A file could not be parsed into recognized objects. Scoped to that
	/// file, non-fatal to the watcher.
	#[error("failed to decode '{}': {source}", path.display())]
	Decode {
		path: PathBuf,
		#[source]
		source: DecodeError,
	},

	/// The OS-level notification mechanism could not be established or was
	/// lost. Fatal at startup.
	#[error("filesystem notification subscription failure: {0}")]
	Subscription(#[from] notify::Error),

	/// File I/O error that includes the path that caused it.
	#[error("file I/O error: {source}; path: '{}'", path.display())]
	FileIo {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("watcher already started")]
	AlreadyStarted,

	#[error("watcher not running")]
	NotRunning,

	/// The watcher was closed; closing ends the event stream for good, so a
	/// closed watcher cannot be restarted.
	#[error("watcher closed")]
	Closed,
}

impl Error {
	pub fn file_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::FileIo {
			path: path.as_ref().to_path_buf(),
			source,
		}
	}

	pub fn scope_mismatch(group_kind: &GroupKind, namespace: Option<&str>) -> Self {
		Self::NamespaceScopeMismatch {
			group_kind: group_kind.clone(),
			namespace: namespace.map(str::to_owned),
		}
	}
}

/// Errors produced while decoding a single file into recognized objects.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("invalid YAML: {0}")]
	Yaml(#[from] serde_yaml::Error),

	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("document is missing required field '{0}'")]
	MissingField(&'static str),
}
