//! Event concatenation: reduces an ordered burst of raw per-path
//! notifications to the minimal sequence of semantic file events.
//!
//! A burst can be self-contradictory: a file deleted and rewritten, or
//! renamed through several intermediate names, all within one debounce
//! window. The reduction is a single forward pass over the burst keeping an
//! output stack and one pending-arrival bit, no backtracking.

use crate::event::{FileEventKind, RawEventKind};

/// Reduce one path's notification burst to its net semantic effect.
///
/// A path that ends the burst where it started (written then deleted)
/// reduces to nothing. Delete-then-recreate is a single `Modify`. A
/// completed arrival/departure rename pair is reported once as `Move`, and
/// nothing folds into a finished `Move`: its net file identity is settled,
/// so later writes or deletes get their own entries.
pub fn concatenate(burst: &[RawEventKind]) -> Vec<FileEventKind> {
	let mut stack: Vec<FileEventKind> = Vec::new();
	let mut pending_move_in = false;

	for &raw in burst {
		if pending_move_in {
			if raw == RawEventKind::MoveOut {
				// Arrival and departure pair up into a completed rename.
				stack.push(FileEventKind::Move);
				pending_move_in = false;
				continue;
			}
			// The arrival never paired; it was an ordinary content change.
			merge(&mut stack, FileEventKind::Modify);
			pending_move_in = false;
		}

		match raw {
			RawEventKind::MoveIn => pending_move_in = true,
			RawEventKind::Write => merge(&mut stack, FileEventKind::Modify),
			// A lone departure means the file left this path.
			RawEventKind::Delete | RawEventKind::MoveOut => {
				merge(&mut stack, FileEventKind::Delete)
			}
		}
	}

	// An arrival still pending at end-of-burst resolves as a content change.
	if pending_move_in {
		merge(&mut stack, FileEventKind::Modify);
	}

	stack
}

fn merge(stack: &mut Vec<FileEventKind>, tag: FileEventKind) {
	match (stack.last().copied(), tag) {
		// A finished Move never merges with what follows it.
		(None | Some(FileEventKind::Move), _) => stack.push(tag),
		(Some(FileEventKind::Delete), FileEventKind::Modify) => {
			// Delete then write nets to a single content change.
			stack.pop();
			stack.push(FileEventKind::Modify);
		}
		(Some(FileEventKind::Modify), FileEventKind::Delete) => {
			// Write then delete nets to no observable change.
			stack.pop();
		}
		// Repeated writes or deletes are idempotent.
		_ => {}
	}
}
