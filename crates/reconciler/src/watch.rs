//! Adapts the kube watcher into the router's event stream.

use std::fmt::Debug;

use futures::{Stream, StreamExt};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::router::WatchEvent;
use crate::types::Declared;

/// Watch every object of `api`, restarting with backoff on errors.
///
/// Watch errors are logged and skipped; the watcher relists on its own and
/// the relist shows up as a resync.
pub fn watch_events<K>(api: Api<K>) -> impl Stream<Item = WatchEvent<K>> + Send
where
    K: Declared + DeserializeOwned + Debug,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(event) => Some(translate(event)),
                Err(err) => {
                    warn!(error = %err, "Watch failed, retrying");
                    None
                }
            }
        })
}

fn translate<K>(event: watcher::Event<K>) -> WatchEvent<K> {
    match event {
        watcher::Event::Apply(obj) => WatchEvent::Applied(obj),
        watcher::Event::Delete(obj) => WatchEvent::Deleted(obj),
        watcher::Event::Init => WatchEvent::ResyncStarted,
        watcher::Event::InitApply(obj) => WatchEvent::Listed(obj),
        watcher::Event::InitDone => WatchEvent::ResyncDone,
    }
}
