//! The filesystem watcher: subscribes to OS notifications for the watched
//! root, batches them per path over a debounce window, reduces each path's
//! burst to semantic file events, and resolves those against the mapping
//! cache into object-level events.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_channel as chan;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::content::{ContentType, ContentTyper, ExtensionContentTyper, GlobExcluder, PathExcluder};
use crate::error::{Error, Result};
use crate::event::{
	object_event_stream, FileEvent, FileEventKind, ObjectEvent, ObjectEventKind,
	ObjectEventReceiver, ObjectEventSender, RawEventKind,
};
use crate::identity::{Namespacer, ObjectId};
use crate::mapping::{ChecksumPath, MappingCache};
use crate::recognize::{ObjectRecognizer, TypeMetaRecognizer};
use crate::scan::scan_tree;

mod concat;

pub use concat::concatenate;

/// Tuning knobs for the watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
	/// How long to keep collecting notifications into one batch after the
	/// first one arrives.
	pub debounce_window: Duration,
	/// Capacity of the bounded object event stream. Publishers block when
	/// the stream is full.
	pub channel_capacity: usize,
	/// Cap on raw notifications per batch; a burst larger than this is split
	/// across batches.
	pub max_batch_events: usize,
	/// Drop attribute-only change notifications instead of treating them as
	/// writes.
	pub ignore_metadata_events: bool,
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			debounce_window: Duration::from_millis(100),
			channel_capacity: 4096,
			max_batch_events: 4096,
			ignore_metadata_events: true,
		}
	}
}

/// Watches a directory of manifests and publishes object-level events.
///
/// Create it, optionally grab receivers via [`ManifestWatcher::subscribe`],
/// then call [`ManifestWatcher::start`] once. `start` performs the initial
/// full scan (so the first live event diffs against a correct baseline)
/// before arming the OS subscription.
pub struct ManifestWatcher {
	root: PathBuf,
	config: WatcherConfig,
	cache: Arc<MappingCache>,
	content_typer: Arc<dyn ContentTyper>,
	excluder: Arc<dyn PathExcluder>,
	recognizer: Arc<dyn ObjectRecognizer>,
	events_tx: ObjectEventSender,
	events_rx: ObjectEventReceiver,
	watcher: Option<RecommendedWatcher>,
	stop_tx: Option<chan::Sender<()>>,
	handle: Option<JoinHandle<()>>,
	closed: bool,
}

impl ManifestWatcher {
	/// Watcher over `root` with the default collaborators: extension-based
	/// content typing, hidden-path exclusion, and the TypeMeta recognizer.
	pub fn new(
		root: impl Into<PathBuf>,
		namespacer: Arc<dyn Namespacer>,
		config: WatcherConfig,
	) -> Self {
		Self::with_collaborators(
			root,
			namespacer,
			Arc::new(ExtensionContentTyper),
			Arc::new(GlobExcluder::default_excludes()),
			Arc::new(TypeMetaRecognizer),
			config,
		)
	}

	pub fn with_collaborators(
		root: impl Into<PathBuf>,
		namespacer: Arc<dyn Namespacer>,
		content_typer: Arc<dyn ContentTyper>,
		excluder: Arc<dyn PathExcluder>,
		recognizer: Arc<dyn ObjectRecognizer>,
		config: WatcherConfig,
	) -> Self {
		let (events_tx, events_rx) = object_event_stream(config.channel_capacity);
		Self {
			root: root.into(),
			config,
			cache: Arc::new(MappingCache::new(namespacer)),
			content_typer,
			excluder,
			recognizer,
			events_tx,
			events_rx,
			watcher: None,
			stop_tx: None,
			handle: None,
			closed: false,
		}
	}

	/// The mapping cache backing this watcher, for lookup-by-name queries.
	pub fn cache(&self) -> &Arc<MappingCache> {
		&self.cache
	}

	/// A receiver on the object event stream. With several receivers each
	/// event is delivered to exactly one of them.
	pub fn subscribe(&self) -> ObjectEventReceiver {
		self.events_rx.clone()
	}

	/// Perform the initial scan and begin live watching.
	///
	/// Any failure here is fatal and leaves the watcher un-started with an
	/// unpopulated cache.
	pub async fn start(&mut self) -> Result<()> {
		if self.watcher.is_some() {
			return Err(Error::AlreadyStarted);
		}
		// Closing ended the event stream; a restarted instance could only
		// publish into the void.
		if self.closed {
			return Err(Error::Closed);
		}

		let root = tokio::fs::canonicalize(&self.root)
			.await
			.map_err(|source| Error::file_io(&self.root, source))?;

		// Arm the subscription first: raw notifications buffer in the
		// channel while the scan runs, so nothing between scan and watch is
		// lost, and a subscription failure aborts before the cache is
		// touched.
		let (raw_tx, raw_rx) = chan::unbounded();
		let mut watcher = RecommendedWatcher::new(
			move |result: notify::Result<notify::Event>| {
				if !raw_tx.is_closed() && raw_tx.send_blocking(result).is_err() {
					error!("failed to forward filesystem notification");
				}
			},
			Config::default(),
		)?;
		watcher.watch(&root, RecursiveMode::Recursive)?;
		info!(root = %root.display(), "watching manifest tree");

		let mappings = {
			let scan_root = root.clone();
			let excluder = Arc::clone(&self.excluder);
			let content_typer = Arc::clone(&self.content_typer);
			let recognizer = Arc::clone(&self.recognizer);
			tokio::task::spawn_blocking(move || {
				scan_tree(
					&scan_root,
					excluder.as_ref(),
					content_typer.as_ref(),
					recognizer.as_ref(),
				)
			})
			.await
			.map_err(|e| {
				Error::file_io(&root, std::io::Error::other(format!("scan task failed: {e}")))
			})??
		};
		debug!(objects = mappings.len(), "initial scan complete");
		self.cache.reset_mappings(mappings)?;

		let (stop_tx, stop_rx) = chan::bounded(1);
		let watch_loop = WatchLoop {
			root: root.clone(),
			config: self.config.clone(),
			cache: Arc::clone(&self.cache),
			content_typer: Arc::clone(&self.content_typer),
			excluder: Arc::clone(&self.excluder),
			recognizer: Arc::clone(&self.recognizer),
			raw_rx,
			stop_rx,
			events_tx: self.events_tx.clone(),
		};
		self.handle = Some(tokio::spawn(watch_loop.run()));
		self.root = root;
		self.watcher = Some(watcher);
		self.stop_tx = Some(stop_tx);

		Ok(())
	}

	/// Stop watching, drain the in-flight batch, and end the event stream.
	/// Safe to call once per started watcher.
	pub async fn close(&mut self) -> Result<()> {
		let Some(mut watcher) = self.watcher.take() else {
			return Err(Error::NotRunning);
		};

		if let Err(e) = watcher.unwatch(&self.root) {
			warn!(error = %e, "failed to release watch on root");
		}
		drop(watcher);

		if let Some(stop_tx) = self.stop_tx.take() {
			let _ = stop_tx.send(()).await;
		}
		if let Some(handle) = self.handle.take() {
			if let Err(e) = handle.await {
				error!(error = %e, "watcher task failed during shutdown");
			}
		}

		// End-of-stream for consumers.
		self.events_tx.close();
		self.closed = true;
		info!(root = %self.root.display(), "manifest watcher closed");
		Ok(())
	}
}

impl Drop for ManifestWatcher {
	fn drop(&mut self) {
		// Wake the loop without needing an async context; the notify handle
		// is released by dropping the watcher itself.
		if let Some(stop_tx) = self.stop_tx.take() {
			stop_tx.close();
		}
	}
}

/// The debounce-and-resolve loop, decoupled from both the notification
/// source and stream consumers.
struct WatchLoop {
	root: PathBuf,
	config: WatcherConfig,
	cache: Arc<MappingCache>,
	content_typer: Arc<dyn ContentTyper>,
	excluder: Arc<dyn PathExcluder>,
	recognizer: Arc<dyn ObjectRecognizer>,
	raw_rx: chan::Receiver<notify::Result<notify::Event>>,
	stop_rx: chan::Receiver<()>,
	events_tx: ObjectEventSender,
}

impl WatchLoop {
	async fn run(self) {
		loop {
			// Wait for the first notification of a batch.
			let first = tokio::select! {
				message = self.raw_rx.recv() => match message {
					Ok(message) => message,
					Err(_) => break,
				},
				_ = self.stop_rx.recv() => break,
			};

			let mut batch = Vec::new();
			self.ingest(first, &mut batch);

			// Keep collecting for one debounce window, then resolve. A stop
			// during collection still drains the batch before exiting, so a
			// path's cache mutations are never left half-applied.
			let mut stopping = false;
			let deadline = tokio::time::sleep(self.config.debounce_window);
			tokio::pin!(deadline);
			while batch.len() < self.config.max_batch_events {
				tokio::select! {
					message = self.raw_rx.recv() => match message {
						Ok(message) => self.ingest(message, &mut batch),
						Err(_) => {
							stopping = true;
							break;
						}
					},
					_ = self.stop_rx.recv() => {
						stopping = true;
						break;
					}
					_ = &mut deadline => break,
				}
			}

			self.process_batch(batch).await;

			if stopping {
				break;
			}
		}
		debug!("watch loop stopped");
	}

	fn ingest(
		&self,
		message: notify::Result<notify::Event>,
		batch: &mut Vec<(PathBuf, RawEventKind)>,
	) {
		match message {
			Ok(event) => {
				trace!(?event, "raw notification");
				batch.extend(RawEventKind::from_notify(
					&event,
					self.config.ignore_metadata_events,
				));
			}
			Err(e) => error!(error = %e, "filesystem notification error"),
		}
	}

	/// Group the batch per path (preserving each path's raw order and the
	/// order paths first appeared), reduce each path's burst, and resolve.
	async fn process_batch(&self, batch: Vec<(PathBuf, RawEventKind)>) {
		if batch.is_empty() {
			return;
		}
		debug!(raw_events = batch.len(), "processing batch");

		let mut order: Vec<PathBuf> = Vec::new();
		let mut bursts: HashMap<PathBuf, Vec<RawEventKind>> = HashMap::new();
		for (path, kind) in batch {
			let Ok(relative) = path.strip_prefix(&self.root) else {
				trace!(path = %path.display(), "notification outside root");
				continue;
			};
			let relative = relative.to_path_buf();
			if !bursts.contains_key(&relative) {
				order.push(relative.clone());
			}
			bursts.entry(relative).or_default().push(kind);
		}

		for path in order {
			let burst = &bursts[&path];
			for kind in concatenate(burst) {
				let event = FileEvent {
					path: path.clone(),
					kind,
				};
				if let Err(e) = self.resolve(&event).await {
					warn!(path = %event.path.display(), error = %e, "failed to resolve file event");
				}
			}
		}
	}

	/// Resolve one semantic file event into object events, applying the
	/// path's cache mutations as a unit.
	async fn resolve(&self, event: &FileEvent) -> Result<()> {
		let path = event.path.as_path();
		if self.excluder.is_excluded(path) {
			trace!(path = %path.display(), "excluded path");
			return Ok(());
		}
		let Some(content_type) = self.content_typer.content_type(path) else {
			trace!(path = %path.display(), "unrecognized content type");
			return Ok(());
		};

		trace!(path = %path.display(), kind = %event.kind, "resolving file event");
		match event.kind {
			FileEventKind::Delete => self.resolve_delete(path).await,
			// A completed rename settles the file's identity, but the net
			// content at this path is re-read either way.
			FileEventKind::Modify | FileEventKind::Move => {
				self.resolve_update(path, content_type).await
			}
		}
	}

	async fn resolve_delete(&self, path: &Path) -> Result<()> {
		let prior = self.cache.objects_at(path).unwrap_or_default();
		for id in prior {
			self.cache.delete_mapping(&id);
			self.publish(ObjectEventKind::Deleted, id).await;
		}
		Ok(())
	}

	async fn resolve_update(&self, path: &Path, content_type: ContentType) -> Result<()> {
		let absolute = self.root.join(path);
		let content = match tokio::fs::read(&absolute).await {
			Ok(content) => content,
			// Gone by resolution time: whatever was here is no more.
			Err(e) if e.kind() == ErrorKind::NotFound => {
				return self.resolve_delete(path).await;
			}
			Err(source) => return Err(Error::file_io(&absolute, source)),
		};

		// A decode failure is scoped to this file and leaves its prior
		// mappings untouched.
		let recognized = self
			.recognizer
			.recognize(&content, content_type)
			.map_err(|source| Error::Decode {
				path: path.to_path_buf(),
				source,
			})?;

		let checksum = blake3::hash(&content).to_hex().to_string();
		let prior = self.cache.objects_at(path).unwrap_or_default();
		let mut current = HashSet::with_capacity(recognized.len());

		for object in recognized {
			let kind = if prior.contains(&object.id) {
				ObjectEventKind::Modified
			} else {
				ObjectEventKind::Added
			};
			if let Err(e) = self.cache.set_mapping(
				&object.id,
				ChecksumPath::new(path.to_path_buf(), checksum.clone()),
			) {
				warn!(id = %object.id, error = %e, "rejecting object with invalid scope");
				continue;
			}
			current.insert(object.id.clone());
			self.publish(kind, object.id).await;
		}

		// Identities that were stored in this file but no longer are.
		for id in prior {
			if !current.contains(&id) {
				self.cache.delete_mapping(&id);
				self.publish(ObjectEventKind::Deleted, id).await;
			}
		}

		Ok(())
	}

	async fn publish(&self, kind: ObjectEventKind, id: ObjectId) {
		debug!(%kind, %id, "publishing object event");
		// Blocks when the stream is full rather than dropping: a consumer
		// that misses a Deleted event can never learn the object is gone.
		if self.events_tx.send(ObjectEvent { kind, id }).await.is_err() {
			warn!("object event stream closed; event discarded");
		}
	}
}
