//! The mapping cache: a bidirectional in-memory index between object
//! identities and the physical files backing them.
//!
//! The cache performs no I/O. It is purely derived state, rebuildable at any
//! time from a full tree scan via [`MappingCache::reset_mappings`]. All
//! information about which files exist is fed through
//! [`MappingCache::set_mapping`]; lookups for anything never set return the
//! untracked-object error rather than guessing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::identity::{GroupKind, Namespacer, ObjectId, ObjectKey};

/// A physical file location plus the content digest recorded when the
/// mapping was last set. The path is relative to the watched root. The
/// checksum lets callers detect staleness; the cache never validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumPath {
	pub path: PathBuf,
	pub checksum: String,
}

impl ChecksumPath {
	pub fn new(path: impl Into<PathBuf>, checksum: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			checksum: checksum.into(),
		}
	}
}

/// Identities partitioned by group/kind and namespace, so namespace and
/// listing queries never scan the whole cache. Root-scoped identities live
/// under the empty namespace key. Exactly one branch is supported today;
/// keying by branch later means holding several of these.
#[derive(Debug, Default)]
struct BranchIndex {
	kinds: HashMap<GroupKind, HashMap<String, HashMap<String, ChecksumPath>>>,
}

impl BranchIndex {
	fn namespace_key(id: &ObjectId) -> &str {
		id.key.namespace.as_deref().unwrap_or("")
	}

	fn get(&self, id: &ObjectId) -> Option<&ChecksumPath> {
		self.kinds
			.get(&id.group_kind)?
			.get(Self::namespace_key(id))?
			.get(&id.key.name)
	}

	fn insert(&mut self, id: &ObjectId, checksum_path: ChecksumPath) {
		self.kinds
			.entry(id.group_kind.clone())
			.or_default()
			.entry(Self::namespace_key(id).to_owned())
			.or_default()
			.insert(id.key.name.clone(), checksum_path);
	}

	fn remove(&mut self, id: &ObjectId) -> Option<ChecksumPath> {
		let namespaces = self.kinds.get_mut(&id.group_kind)?;
		let names = namespaces.get_mut(Self::namespace_key(id))?;
		let removed = names.remove(&id.key.name);
		// Prune empty partitions so namespace listings stay accurate.
		if names.is_empty() {
			namespaces.remove(Self::namespace_key(id));
		}
		if namespaces.is_empty() {
			self.kinds.remove(&id.group_kind);
		}
		removed
	}
}

/// Both cache views. Guarded by a single lock so a reader can never observe
/// one view updated and not the other.
#[derive(Debug, Default)]
struct CacheInner {
	branch: BranchIndex,
	path_to_ids: HashMap<PathBuf, HashSet<ObjectId>>,
}

impl CacheInner {
	/// Upsert the mapping for `id`, keeping both views consistent. If the
	/// identity was previously stored under another path, it is unlinked
	/// from that path's identity set first.
	fn set(&mut self, id: &ObjectId, checksum_path: ChecksumPath) {
		if let Some(previous) = self.branch.remove(id) {
			if previous.path != checksum_path.path {
				self.unlink_path(&previous.path, id);
			}
		}
		self.path_to_ids
			.entry(checksum_path.path.clone())
			.or_default()
			.insert(id.clone());
		self.branch.insert(id, checksum_path);
	}

	fn delete(&mut self, id: &ObjectId) {
		if let Some(previous) = self.branch.remove(id) {
			self.unlink_path(&previous.path, id);
		}
	}

	fn unlink_path(&mut self, path: &Path, id: &ObjectId) {
		if let Some(ids) = self.path_to_ids.get_mut(path) {
			ids.remove(id);
			if ids.is_empty() {
				self.path_to_ids.remove(path);
			}
		}
	}
}

/// In-memory index from object identity to physical location and back.
///
/// Mutating operations take the write lock, reads take the read lock, and no
/// I/O ever happens while holding either.
pub struct MappingCache {
	namespacer: Arc<dyn Namespacer>,
	inner: RwLock<CacheInner>,
}

impl MappingCache {
	pub fn new(namespacer: Arc<dyn Namespacer>) -> Self {
		Self {
			namespacer,
			inner: RwLock::new(CacheInner::default()),
		}
	}

	/// The path (relative to the root) currently backing `id`.
	pub fn object_path(&self, id: &ObjectId) -> Result<PathBuf> {
		self.get_mapping(id)
			.map(|cp| cp.path)
			.ok_or_else(|| Error::NotTracked(id.clone()))
	}

	/// The identities stored in the file at the given relative path.
	pub fn objects_at(&self, path: &Path) -> Result<HashSet<ObjectId>> {
		self.read()
			.path_to_ids
			.get(path)
			.cloned()
			.ok_or_else(|| Error::NotTrackedPath(path.to_path_buf()))
	}

	/// The namespaces any tracked object of the given kind lives in. Only
	/// valid for namespaced kinds.
	pub fn list_namespaces(&self, group_kind: &GroupKind) -> Result<BTreeSet<String>> {
		if !self.namespacer.is_namespaced(group_kind) {
			return Err(Error::scope_mismatch(group_kind, None));
		}
		let inner = self.read();
		Ok(inner
			.branch
			.kinds
			.get(group_kind)
			.map(|namespaces| namespaces.keys().cloned().collect())
			.unwrap_or_default())
	}

	/// The tracked identities of the given kind. Namespaced kinds require a
	/// non-empty namespace selecting exactly that namespace; root-scoped
	/// kinds require `None`.
	pub fn list_object_ids(
		&self,
		group_kind: &GroupKind,
		namespace: Option<&str>,
	) -> Result<HashSet<ObjectId>> {
		let namespaced = self.namespacer.is_namespaced(group_kind);
		let namespace_key = match (namespaced, namespace) {
			(true, Some(ns)) if !ns.is_empty() => ns,
			(false, None) => "",
			_ => return Err(Error::scope_mismatch(group_kind, namespace)),
		};

		let inner = self.read();
		let Some(names) = inner
			.branch
			.kinds
			.get(group_kind)
			.and_then(|namespaces| namespaces.get(namespace_key))
		else {
			return Ok(HashSet::new());
		};

		Ok(names
			.keys()
			.map(|name| ObjectId {
				group_kind: group_kind.clone(),
				key: ObjectKey {
					namespace: namespace.map(str::to_owned),
					name: name.clone(),
				},
			})
			.collect())
	}

	pub fn get_mapping(&self, id: &ObjectId) -> Option<ChecksumPath> {
		self.read().branch.get(id).cloned()
	}

	/// Idempotent upsert, updating both views atomically. Fails if the
	/// identity's namespace shape contradicts the kind's declared scope.
	pub fn set_mapping(&self, id: &ObjectId, checksum_path: ChecksumPath) -> Result<()> {
		self.check_scope(id)?;
		self.write().set(id, checksum_path);
		Ok(())
	}

	/// Atomically discard all current mappings and replace them with exactly
	/// the given set. Used after a full rescan to resynchronize with ground
	/// truth. Never observable as a partial replacement.
	pub fn reset_mappings(&self, mappings: HashMap<ObjectId, ChecksumPath>) -> Result<()> {
		// Validate everything up front so a scope error leaves the current
		// mappings untouched.
		for id in mappings.keys() {
			self.check_scope(id)?;
		}
		let mut inner = self.write();
		*inner = CacheInner::default();
		for (id, checksum_path) in mappings {
			inner.set(&id, checksum_path);
		}
		Ok(())
	}

	/// Remove `id` from both views. A no-op if the identity was untracked.
	pub fn delete_mapping(&self, id: &ObjectId) {
		self.write().delete(id);
	}

	fn check_scope(&self, id: &ObjectId) -> Result<()> {
		let namespaced = self.namespacer.is_namespaced(&id.group_kind);
		if namespaced != id.has_namespace() {
			return Err(Error::scope_mismatch(
				&id.group_kind,
				id.key.namespace.as_deref(),
			));
		}
		Ok(())
	}

	fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheInner> {
		self.inner.read().expect("mapping cache lock poisoned")
	}

	fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheInner> {
		self.inner.write().expect("mapping cache lock poisoned")
	}
}

impl std::fmt::Debug for MappingCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.read();
		f.debug_struct("MappingCache")
			.field("tracked_paths", &inner.path_to_ids.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::StaticNamespacer;

	fn namespaced_cache() -> MappingCache {
		MappingCache::new(Arc::new(StaticNamespacer {
			namespaced_by_default: true,
		}))
	}

	fn root_cache() -> MappingCache {
		MappingCache::new(Arc::new(StaticNamespacer {
			namespaced_by_default: false,
		}))
	}

	fn id(namespace: &str, name: &str) -> ObjectId {
		ObjectId::new(
			GroupKind::new("apps", "Deployment"),
			ObjectKey::namespaced(namespace, name),
		)
	}

	fn cp(path: &str) -> ChecksumPath {
		ChecksumPath::new(path, "digest")
	}

	/// Both views must agree after every mutation.
	fn assert_views_consistent(cache: &MappingCache) {
		let inner = cache.read();
		for (gk, namespaces) in &inner.branch.kinds {
			for (ns, names) in namespaces {
				for (name, checksum_path) in names {
					let object = ObjectId {
						group_kind: gk.clone(),
						key: ObjectKey {
							namespace: (!ns.is_empty()).then(|| ns.clone()),
							name: name.clone(),
						},
					};
					let ids = inner
						.path_to_ids
						.get(&checksum_path.path)
						.expect("path view missing entry present in identity view");
					assert!(ids.contains(&object));
				}
			}
		}
		for (path, ids) in &inner.path_to_ids {
			assert!(!ids.is_empty(), "empty identity set not pruned");
			for object in ids {
				let checksum_path = inner
					.branch
					.get(object)
					.expect("identity view missing entry present in path view");
				assert_eq!(&checksum_path.path, path);
			}
		}
	}

	#[test]
	fn set_then_get() {
		let cache = namespaced_cache();
		cache.set_mapping(&id("default", "web"), cp("apps/web.yaml")).unwrap();

		assert_eq!(
			cache.get_mapping(&id("default", "web")),
			Some(cp("apps/web.yaml"))
		);
		assert_eq!(
			cache.object_path(&id("default", "web")).unwrap(),
			PathBuf::from("apps/web.yaml")
		);
		assert_views_consistent(&cache);
	}

	#[test]
	fn untracked_lookups_error() {
		let cache = namespaced_cache();
		assert!(matches!(
			cache.object_path(&id("default", "web")),
			Err(Error::NotTracked(_))
		));
		assert!(matches!(
			cache.objects_at(Path::new("apps/web.yaml")),
			Err(Error::NotTrackedPath(_))
		));
	}

	#[test]
	fn set_mapping_moves_identity_between_paths() {
		let cache = namespaced_cache();
		let object = id("default", "web");
		cache.set_mapping(&object, cp("old.yaml")).unwrap();
		cache.set_mapping(&object, cp("new.yaml")).unwrap();

		// The old path must be fully unlinked, not just overwritten.
		assert!(matches!(
			cache.objects_at(Path::new("old.yaml")),
			Err(Error::NotTrackedPath(_))
		));
		assert!(cache
			.objects_at(Path::new("new.yaml"))
			.unwrap()
			.contains(&object));
		assert_views_consistent(&cache);
	}

	#[test]
	fn multi_document_path_tracks_many_identities() {
		let cache = namespaced_cache();
		cache.set_mapping(&id("default", "a"), cp("multi.yaml")).unwrap();
		cache.set_mapping(&id("default", "b"), cp("multi.yaml")).unwrap();

		let ids = cache.objects_at(Path::new("multi.yaml")).unwrap();
		assert_eq!(ids.len(), 2);

		cache.delete_mapping(&id("default", "a"));
		let ids = cache.objects_at(Path::new("multi.yaml")).unwrap();
		assert_eq!(ids.len(), 1);
		assert_views_consistent(&cache);

		// Deleting the last identity prunes the path entry entirely.
		cache.delete_mapping(&id("default", "b"));
		assert!(cache.objects_at(Path::new("multi.yaml")).is_err());
		assert_views_consistent(&cache);
	}

	#[test]
	fn delete_untracked_is_a_noop() {
		let cache = namespaced_cache();
		cache.delete_mapping(&id("default", "ghost"));
		assert_views_consistent(&cache);
	}

	#[test]
	fn reset_replaces_everything() {
		let cache = namespaced_cache();
		cache.set_mapping(&id("default", "old"), cp("old.yaml")).unwrap();

		let mut mappings = HashMap::new();
		mappings.insert(id("default", "a"), cp("a.yaml"));
		mappings.insert(id("prod", "b"), cp("b.yaml"));
		cache.reset_mappings(mappings.clone()).unwrap();

		for (object, checksum_path) in &mappings {
			assert_eq!(cache.get_mapping(object).as_ref(), Some(checksum_path));
		}
		assert_eq!(cache.get_mapping(&id("default", "old")), None);
		assert_views_consistent(&cache);
	}

	#[test]
	fn list_namespaces_and_object_ids() {
		let cache = namespaced_cache();
		cache.set_mapping(&id("default", "a"), cp("a.yaml")).unwrap();
		cache.set_mapping(&id("default", "b"), cp("b.yaml")).unwrap();
		cache.set_mapping(&id("prod", "c"), cp("c.yaml")).unwrap();

		let gk = GroupKind::new("apps", "Deployment");
		let namespaces = cache.list_namespaces(&gk).unwrap();
		assert_eq!(
			namespaces.into_iter().collect::<Vec<_>>(),
			vec!["default".to_owned(), "prod".to_owned()]
		);

		let ids = cache.list_object_ids(&gk, Some("default")).unwrap();
		assert_eq!(ids.len(), 2);
		assert!(ids.contains(&id("default", "a")));

		// Deleting the only object in a namespace drops the namespace.
		cache.delete_mapping(&id("prod", "c"));
		let namespaces = cache.list_namespaces(&gk).unwrap();
		assert_eq!(namespaces.into_iter().collect::<Vec<_>>(), vec!["default"]);
	}

	#[test]
	fn scope_mismatches_are_errors() {
		let gk = GroupKind::new("", "Node");

		let cache = root_cache();
		// Root-scoped kind queried with a namespace.
		assert!(matches!(
			cache.list_object_ids(&gk, Some("default")),
			Err(Error::NamespaceScopeMismatch { .. })
		));
		// Namespace listing is only valid for namespaced kinds.
		assert!(matches!(
			cache.list_namespaces(&gk),
			Err(Error::NamespaceScopeMismatch { .. })
		));
		// Storing a namespaced identity under a root-scoped kind.
		assert!(matches!(
			cache.set_mapping(
				&ObjectId::new(gk.clone(), ObjectKey::namespaced("default", "n1")),
				cp("n1.yaml"),
			),
			Err(Error::NamespaceScopeMismatch { .. })
		));

		let cache = namespaced_cache();
		// Namespaced kind queried without a namespace.
		assert!(matches!(
			cache.list_object_ids(&GroupKind::new("apps", "Deployment"), None),
			Err(Error::NamespaceScopeMismatch { .. })
		));

		// Root-scoped listing with `None` works.
		let cache = root_cache();
		cache
			.set_mapping(
				&ObjectId::new(gk.clone(), ObjectKey::root("n1")),
				cp("n1.yaml"),
			)
			.unwrap();
		assert_eq!(cache.list_object_ids(&gk, None).unwrap().len(), 1);
	}
}
