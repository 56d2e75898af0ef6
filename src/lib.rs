//! Filesystem-backed object store with live change notification.
//!
//! A directory of YAML/JSON manifests is treated as a watchable object
//! database: every object is identified by its group/kind/namespace/name
//! tuple, an in-memory [`MappingCache`] indexes identities to the files
//! backing them (and back), and a [`ManifestWatcher`] reduces raw
//! filesystem notification bursts to the smallest correct set of
//! object-level events on a bounded stream.
//!
//! ```no_run
//! use std::sync::Arc;
//! use manifest_store::{ManifestWatcher, StaticNamespacer, WatcherConfig};
//!
//! # async fn run() -> manifest_store::Result<()> {
//! let mut watcher = ManifestWatcher::new(
//!     "/tmp/manifests",
//!     Arc::new(StaticNamespacer::default()),
//!     WatcherConfig::default(),
//! );
//! let events = watcher.subscribe();
//! watcher.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{} {}", event.kind, event.id);
//! }
//! watcher.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod error;
pub mod event;
pub mod identity;
pub mod mapping;
pub mod recognize;
mod scan;
pub mod watcher;

pub use content::{ContentType, ContentTyper, ExtensionContentTyper, GlobExcluder, PathExcluder};
pub use error::{DecodeError, Error, Result};
pub use event::{
	object_event_stream, FileEvent, FileEventKind, ObjectEvent, ObjectEventKind,
	ObjectEventReceiver, ObjectEventSender, RawEventKind,
};
pub use identity::{GroupKind, Namespacer, ObjectId, ObjectKey, StaticNamespacer};
pub use mapping::{ChecksumPath, MappingCache};
pub use recognize::{ObjectRecognizer, RecognizedObject, TypeMetaRecognizer};
pub use watcher::{concatenate, ManifestWatcher, WatcherConfig};
