//! Content typing and path exclusion for files under the watched root.
//!
//! Both collaborators operate on paths relative to the root, so hidden
//! ancestors of the root itself (say a tempdir under `/.cache`) never
//! influence the verdict.

use std::ffi::OsStr;
use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Recognized manifest content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
	Yaml,
	Json,
}

/// Maps a relative path to a content type, or `None` when the file is not
/// recognized and should be ignored by the watcher.
pub trait ContentTyper: Send + Sync + 'static {
	fn content_type(&self, path: &Path) -> Option<ContentType>;
}

/// Default content typer: sniffs from the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionContentTyper;

impl ContentTyper for ExtensionContentTyper {
	fn content_type(&self, path: &Path) -> Option<ContentType> {
		match path.extension().and_then(OsStr::to_str) {
			Some("yaml" | "yml") => Some(ContentType::Yaml),
			Some("json") => Some(ContentType::Json),
			_ => None,
		}
	}
}

/// Decides whether a relative path is excluded from tracking entirely.
pub trait PathExcluder: Send + Sync + 'static {
	fn is_excluded(&self, path: &Path) -> bool;
}

/// Default excluder: rejects hidden files and directories (any path
/// component starting with `.`, which covers VCS metadata like `.git`) plus
/// an optional set of user-supplied globs.
#[derive(Debug, Clone)]
pub struct GlobExcluder {
	globs: GlobSet,
	exclude_hidden: bool,
}

impl GlobExcluder {
	pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			builder.add(Glob::new(pattern.as_ref())?);
		}
		Ok(Self {
			globs: builder.build()?,
			exclude_hidden: true,
		})
	}

	/// The default exclusion set: hidden paths plus common editor droppings.
	pub fn default_excludes() -> Self {
		Self::new(["**/*.tmp", "**/*.swp", "**/*~"])
			.expect("static default globs are valid")
	}
}

impl Default for GlobExcluder {
	fn default() -> Self {
		Self::default_excludes()
	}
}

impl PathExcluder for GlobExcluder {
	fn is_excluded(&self, path: &Path) -> bool {
		if self.exclude_hidden
			&& path.components().any(|component| {
				matches!(
					component,
					Component::Normal(name) if name.to_string_lossy().starts_with('.')
				)
			}) {
			return true;
		}
		self.globs.is_match(path)
	}
}
