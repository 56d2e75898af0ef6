//! Watch a directory of manifests and log every object-level event.
//!
//! Usage: `manifest-watch [DIR]` (defaults to `/tmp/manifest-store/watch`).
//! All objects are treated as root-scoped; set `RUST_LOG` to control
//! verbosity.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use manifest_store::{Error, ManifestWatcher, StaticNamespacer, WatcherConfig};

#[tokio::main]
async fn main() -> manifest_store::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let root = std::env::args()
		.nth(1)
		.unwrap_or_else(|| "/tmp/manifest-store/watch".to_owned());
	std::fs::create_dir_all(&root).map_err(|source| Error::file_io(&root, source))?;

	let mut watcher = ManifestWatcher::new(
		&root,
		Arc::new(StaticNamespacer {
			namespaced_by_default: false,
		}),
		WatcherConfig::default(),
	);
	let events = watcher.subscribe();
	watcher.start().await?;
	info!(%root, "watching for manifest changes, ctrl-c to stop");

	loop {
		tokio::select! {
			event = events.recv() => match event {
				Ok(event) => info!("{} {}", event.kind, event.id),
				Err(_) => break,
			},
			_ = tokio::signal::ctrl_c() => break,
		}
	}

	watcher.close().await
}
