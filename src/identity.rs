//! Object identities: the logical group/kind/namespace/name key of a tracked
//! object, independent of the physical file backing it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The group and kind of an object, e.g. `("apps", "Deployment")`. The core
/// API group uses an empty group string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
	pub group: String,
	pub kind: String,
}

impl GroupKind {
	pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			kind: kind.into(),
		}
	}

	/// Derive a `GroupKind` from an `apiVersion` string: `"apps/v1"` carries
	/// group `"apps"`, a bare `"v1"` means the core (empty) group.
	pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
		let group = match api_version.split_once('/') {
			Some((group, _version)) => group.to_owned(),
			None => String::new(),
		};
		Self {
			group,
			kind: kind.into(),
		}
	}
}

impl fmt::Display for GroupKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.group.is_empty() {
			write!(f, "{}", self.kind)
		} else {
			write!(f, "{}.{}", self.kind, self.group)
		}
	}
}

/// The namespace/name pair of an object. `namespace` is `None` for
/// root-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
	pub namespace: Option<String>,
	pub name: String,
}

impl ObjectKey {
	/// Key for an object of a root-scoped kind.
	pub fn root(name: impl Into<String>) -> Self {
		Self {
			namespace: None,
			name: name.into(),
		}
	}

	/// Key for an object of a namespaced kind.
	pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: Some(namespace.into()),
			name: name.into(),
		}
	}
}

impl fmt::Display for ObjectKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(namespace) => write!(f, "{namespace}/{}", self.name),
			None => write!(f, "{}", self.name),
		}
	}
}

/// The full logical identity of a tracked object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
	pub group_kind: GroupKind,
	pub key: ObjectKey,
}

impl ObjectId {
	pub fn new(group_kind: GroupKind, key: ObjectKey) -> Self {
		Self { group_kind, key }
	}

	/// Whether the identity carries a non-empty namespace.
	pub fn has_namespace(&self) -> bool {
		self.key
			.namespace
			.as_deref()
			.is_some_and(|ns| !ns.is_empty())
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.group_kind, self.key)
	}
}

/// Policy declaring whether a kind's identities are partitioned by namespace
/// or global to the tree. Supplied by the external scheme.
pub trait Namespacer: Send + Sync + 'static {
	fn is_namespaced(&self, group_kind: &GroupKind) -> bool;
}

/// A `Namespacer` applying one policy to every kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticNamespacer {
	pub namespaced_by_default: bool,
}

impl Namespacer for StaticNamespacer {
	fn is_namespaced(&self, _group_kind: &GroupKind) -> bool {
		self.namespaced_by_default
	}
}
