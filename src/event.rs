//! Event types: raw per-path notification kinds, semantic file events, and
//! the object-level events published to consumers.

use std::fmt;
use std::path::PathBuf;

use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

use crate::identity::ObjectId;

/// A raw per-path filesystem notification, classified at the ingestion
/// boundary. Platform-specific notification codes are translated here, once,
/// by [`RawEventKind::from_notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEventKind {
	/// Content was flushed to the path.
	Write,
	/// The path was removed.
	Delete,
	/// A file arrived at this path via rename.
	MoveIn,
	/// A file departed this path via rename.
	MoveOut,
}

impl RawEventKind {
	/// Translate a notify event into per-path raw kinds. A single notify
	/// event can fan out to several entries (a `RenameMode::Both` event
	/// carries the departure path and the arrival path).
	///
	/// Unrecognized kinds map to `Write` conservatively; attribute-only
	/// changes are dropped when `ignore_metadata_events` is set.
	pub fn from_notify(
		event: &notify::Event,
		ignore_metadata_events: bool,
	) -> Vec<(PathBuf, RawEventKind)> {
		let all = |kind: RawEventKind| {
			event
				.paths
				.iter()
				.map(|path| (path.clone(), kind))
				.collect::<Vec<_>>()
		};

		match event.kind {
			EventKind::Create(_) => all(Self::Write),
			EventKind::Remove(_) => all(Self::Delete),
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
				.paths
				.first()
				.map(|path| vec![(path.clone(), Self::MoveOut)])
				.unwrap_or_default(),
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
				.paths
				.first()
				.map(|path| vec![(path.clone(), Self::MoveIn)])
				.unwrap_or_default(),
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
				// paths[0] is the old name, paths[1] the new one.
				let mut out = Vec::with_capacity(2);
				if let Some(from) = event.paths.first() {
					out.push((from.clone(), Self::MoveOut));
				}
				if let Some(to) = event.paths.get(1) {
					out.push((to.clone(), Self::MoveIn));
				}
				out
			}
			// Ambiguous rename halves (macOS reports RenameMode::Any); a
			// write is the conservative reading, and resolution degrades to
			// delete handling when the file turns out to be gone.
			EventKind::Modify(ModifyKind::Name(_)) => all(Self::Write),
			EventKind::Modify(ModifyKind::Metadata(_)) if ignore_metadata_events => Vec::new(),
			EventKind::Modify(_) => all(Self::Write),
			EventKind::Access(AccessKind::Close(AccessMode::Write)) => all(Self::Write),
			EventKind::Access(_) => Vec::new(),
			_ => all(Self::Write),
		}
	}
}

/// The net semantic effect of a notification burst on one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
	Modify,
	Move,
	Delete,
}

impl fmt::Display for FileEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Modify => "MODIFY",
			Self::Move => "MOVE",
			Self::Delete => "DELETE",
		})
	}
}

/// A semantic file event, relative to the watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
	pub path: PathBuf,
	pub kind: FileEventKind,
}

/// The kind of change an object underwent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectEventKind {
	Added,
	Modified,
	Deleted,
}

impl fmt::Display for ObjectEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Added => "ADDED",
			Self::Modified => "MODIFIED",
			Self::Deleted => "DELETED",
		})
	}
}

/// The unit published on the object event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEvent {
	pub kind: ObjectEventKind,
	pub id: ObjectId,
}

pub type ObjectEventSender = async_channel::Sender<ObjectEvent>;
pub type ObjectEventReceiver = async_channel::Receiver<ObjectEvent>;

/// Create the bounded object event stream. Senders block when the stream is
/// full; events are never dropped silently, because a consumer that misses a
/// `Deleted` event can never know an object disappeared.
pub fn object_event_stream(capacity: usize) -> (ObjectEventSender, ObjectEventReceiver) {
	async_channel::bounded(capacity)
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
	use std::path::Path;

	fn notify_event(kind: EventKind, paths: &[&str]) -> notify::Event {
		let mut event = notify::Event::new(kind);
		for path in paths {
			event = event.add_path(PathBuf::from(path));
		}
		event
	}

	#[test]
	fn create_and_close_write_map_to_write() {
		for kind in [
			EventKind::Create(CreateKind::File),
			EventKind::Modify(ModifyKind::Data(DataChange::Any)),
			EventKind::Access(AccessKind::Close(AccessMode::Write)),
		] {
			let raw = RawEventKind::from_notify(&notify_event(kind, &["/r/a.yaml"]), true);
			assert_eq!(raw, vec![(PathBuf::from("/r/a.yaml"), RawEventKind::Write)]);
		}
	}

	#[test]
	fn remove_maps_to_delete() {
		let raw = RawEventKind::from_notify(
			&notify_event(EventKind::Remove(RemoveKind::File), &["/r/a.yaml"]),
			true,
		);
		assert_eq!(raw, vec![(PathBuf::from("/r/a.yaml"), RawEventKind::Delete)]);
	}

	#[test]
	fn rename_both_fans_out_to_both_paths() {
		let raw = RawEventKind::from_notify(
			&notify_event(
				EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
				&["/r/old.yaml", "/r/new.yaml"],
			),
			true,
		);
		assert_eq!(
			raw,
			vec![
				(PathBuf::from("/r/old.yaml"), RawEventKind::MoveOut),
				(PathBuf::from("/r/new.yaml"), RawEventKind::MoveIn),
			]
		);
	}

	#[test]
	fn rename_halves_map_to_moves() {
		let from = RawEventKind::from_notify(
			&notify_event(
				EventKind::Modify(ModifyKind::Name(RenameMode::From)),
				&["/r/old.yaml"],
			),
			true,
		);
		assert_eq!(from[0].1, RawEventKind::MoveOut);

		let to = RawEventKind::from_notify(
			&notify_event(
				EventKind::Modify(ModifyKind::Name(RenameMode::To)),
				&["/r/new.yaml"],
			),
			true,
		);
		assert_eq!(to[0].1, RawEventKind::MoveIn);
	}

	#[test]
	fn metadata_events_honor_the_policy() {
		let event = notify_event(
			EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
			&["/r/a.yaml"],
		);
		assert!(RawEventKind::from_notify(&event, true).is_empty());
		assert_eq!(
			RawEventKind::from_notify(&event, false),
			vec![(Path::new("/r/a.yaml").to_path_buf(), RawEventKind::Write)]
		);
	}
}
