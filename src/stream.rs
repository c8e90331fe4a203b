//! Streaming batch API: emit results as documents finish.
//!
//! [`crate::ingest::IngestionAgent::process_batch`] returns only after every
//! document is done. [`process_stream`] yields each [`IngestionResult`] as
//! soon as its document completes, so callers can report or persist
//! incrementally. Results arrive in completion order; use
//! `IngestionResult::source_path` to match them to inputs.

use crate::ingest::IngestionAgent;
use crate::output::IngestionResult;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document results.
pub type ResultStream = Pin<Box<dyn Stream<Item = IngestionResult> + Send>>;

/// Ingest `paths` with up to `agent.config().concurrency` documents in
/// flight, yielding results as they complete.
///
/// Per-document progress events are fired; batch start/complete events are
/// left to the caller, who knows when it stops consuming the stream.
pub fn process_stream<I, P>(agent: Arc<IngestionAgent>, paths: I, persist: bool) -> ResultStream
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
    let concurrency = agent.config().concurrency;
    info!(
        "Starting streaming ingestion: {} documents, concurrency {}",
        paths.len(),
        concurrency
    );

    let s = stream::iter(paths.into_iter().map(move |path| {
        let agent = Arc::clone(&agent);
        async move { agent.process_reporting(&path, persist).await }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
