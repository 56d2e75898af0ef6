//! Initial full-tree scan, producing the ground-truth mapping set the cache
//! is reset to before live watching begins.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::content::{ContentTyper, PathExcluder};
use crate::error::{Error, Result};
use crate::identity::ObjectId;
use crate::mapping::ChecksumPath;
use crate::recognize::ObjectRecognizer;

/// Walk the root and decode every recognized file into its identities.
///
/// Walk errors are fatal (the caller must not start watching over a tree it
/// could not read); a file that fails to decode is reported and skipped, the
/// same policy the live watcher applies.
pub(crate) fn scan_tree(
	root: &Path,
	excluder: &dyn PathExcluder,
	content_typer: &dyn ContentTyper,
	recognizer: &dyn ObjectRecognizer,
) -> Result<HashMap<ObjectId, ChecksumPath>> {
	let mut mappings = HashMap::new();

	let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
		match entry.path().strip_prefix(root) {
			// Never filter out the root itself (its relative path is empty).
			Ok(relative) => relative.as_os_str().is_empty() || !excluder.is_excluded(relative),
			Err(_) => true,
		}
	});

	for entry in walker {
		let entry = entry.map_err(|e| {
			let path = e.path().unwrap_or(root).to_path_buf();
			match e.into_io_error() {
				Some(source) => Error::FileIo { path, source },
				None => Error::file_io(
					&path,
					std::io::Error::other("filesystem loop encountered during scan"),
				),
			}
		})?;

		if !entry.file_type().is_file() {
			continue;
		}
		let Ok(relative) = entry.path().strip_prefix(root) else {
			continue;
		};
		let Some(content_type) = content_typer.content_type(relative) else {
			continue;
		};

		let content = std::fs::read(entry.path())
			.map_err(|source| Error::file_io(entry.path(), source))?;
		let checksum = blake3::hash(&content).to_hex().to_string();

		match recognizer.recognize(&content, content_type) {
			Ok(objects) => {
				for object in objects {
					debug!(id = %object.id, path = %relative.display(), "scanned object");
					mappings.insert(
						object.id,
						ChecksumPath::new(relative.to_path_buf(), checksum.clone()),
					);
				}
			}
			Err(e) => {
				warn!(
					path = %relative.display(),
					error = %e,
					"skipping undecodable file during initial scan",
				);
			}
		}
	}

	Ok(mappings)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::content::{ExtensionContentTyper, GlobExcluder};
	use crate::identity::{GroupKind, ObjectId, ObjectKey};
	use crate::recognize::TypeMetaRecognizer;

	fn scan(root: &Path) -> HashMap<ObjectId, ChecksumPath> {
		scan_tree(
			root,
			&GlobExcluder::default_excludes(),
			&ExtensionContentTyper,
			&TypeMetaRecognizer,
		)
		.unwrap()
	}

	#[test]
	fn scans_nested_manifests_and_skips_noise() {
		let root = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(root.path().join("apps")).unwrap();
		std::fs::create_dir_all(root.path().join(".git")).unwrap();

		std::fs::write(
			root.path().join("apps/web.yaml"),
			"apiVersion: v1\nkind: Car\nmetadata:\n  name: web\n",
		)
		.unwrap();
		std::fs::write(
			root.path().join(".git/state.yaml"),
			"apiVersion: v1\nkind: Car\nmetadata:\n  name: vcs\n",
		)
		.unwrap();
		std::fs::write(root.path().join("notes.txt"), "not a manifest").unwrap();
		std::fs::write(root.path().join("broken.yaml"), "kind: [oops\n").unwrap();

		let mappings = scan(root.path());
		assert_eq!(mappings.len(), 1);

		let id = ObjectId::new(GroupKind::new("", "Car"), ObjectKey::root("web"));
		let checksum_path = mappings.get(&id).expect("web object scanned");
		assert_eq!(checksum_path.path, Path::new("apps/web.yaml"));
		assert!(!checksum_path.checksum.is_empty());
	}

	#[test]
	fn multi_document_files_yield_one_mapping_per_identity() {
		let root = tempfile::tempdir().unwrap();
		std::fs::write(
			root.path().join("multi.yaml"),
			"apiVersion: v1\nkind: Car\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: Car\nmetadata:\n  name: b\n",
		)
		.unwrap();

		let mappings = scan(root.path());
		assert_eq!(mappings.len(), 2);
		let checksums: Vec<_> = mappings.values().map(|cp| cp.checksum.clone()).collect();
		assert_eq!(checksums[0], checksums[1]);
	}
}
