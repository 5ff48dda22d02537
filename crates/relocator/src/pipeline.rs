//! Pipeline orchestration: read, rewrite, fetch, write.
//!
//! Stages are entered strictly in order
//! (`Idle -> Reading -> Transforming -> Fetching -> Writing -> Done`); any
//! failure moves to the absorbing `Failed` stage and no output is returned.
//! Auxiliary fetches are started when rewriting starts and overlap with it;
//! `Fetching` is the barrier that waits for whatever is still in flight.

use crate::classify::classify;
use crate::error::{FetchError, RelocateError};
use crate::fetch::{spawn_fetches, Fetch};
use crate::reader::read_archive;
use crate::rewrite::{rewrite_path, ContentRewriter};
use crate::types::{Entry, EntryKind, RelocateConfig, Stage, TransformOutput, TransformStats};
use crate::writer::write_archive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Type alias for stage observer callbacks.
///
/// Called once for every stage the pipeline enters, including the final
/// `Done` or `Failed`.
pub type StageCallback<'a> = dyn Fn(&Stage) + Send + Sync + 'a;

/// A configured transform pipeline.
///
/// The configuration and fetcher are shared read-only, so one `Relocator`
/// can serve any number of concurrent `transform` calls.
pub struct Relocator<F> {
    config: Arc<RelocateConfig>,
    content: Arc<ContentRewriter>,
    fetcher: Arc<F>,
}

impl<F: Fetch + 'static> Relocator<F> {
    pub fn new(config: RelocateConfig, fetcher: F) -> Result<Self, RelocateError> {
        config.validate()?;
        let content = ContentRewriter::new(&config.rule, &config.variants);
        Ok(Self {
            config: Arc::new(config),
            content: Arc::new(content),
            fetcher: Arc::new(fetcher),
        })
    }

    pub fn config(&self) -> &RelocateConfig {
        &self.config
    }

    /// Transform an archive with no observer and no cancellation.
    pub async fn transform(&self, archive: Vec<u8>) -> Result<TransformOutput, RelocateError> {
        self.transform_with(archive, &|_: &Stage| {}, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Transform an archive, reporting stages to `on_stage` and stopping
    /// with [`RelocateError::Cancelled`] once `cancel_flag` is set.
    pub async fn transform_with(
        &self,
        archive: Vec<u8>,
        on_stage: &StageCallback<'_>,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<TransformOutput, RelocateError> {
        let mut stages = StageTracker::new(on_stage);
        match self.run(archive, &mut stages, cancel_flag).await {
            Ok(output) => {
                stages.enter(Stage::Done);
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "transform failed");
                stages.enter(Stage::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        archive: Vec<u8>,
        stages: &mut StageTracker<'_>,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<TransformOutput, RelocateError> {
        let start_time = Instant::now();

        stages.enter(Stage::Reading);
        let options = self.config.options.clone();
        let entries = tokio::task::spawn_blocking(move || read_archive(&archive, &options))
            .await
            .map_err(|e| task_failed(&Stage::Reading, e))??;
        check_cancelled(&cancel_flag)?;
        let entries_read = entries.len() as u64;
        info!(entries = entries_read, "archive read");

        stages.enter(Stage::Transforming);
        let locators: Vec<_> = self
            .config
            .auxiliaries
            .iter()
            .map(|aux| aux.locator.clone())
            .collect();
        let mut fetches = spawn_fetches(Arc::clone(&self.fetcher), &locators);
        let mut fetched: Vec<Option<Vec<u8>>> = vec![None; locators.len()];

        // Tells the rewrite worker to stop early once the call is doomed
        let stop = Arc::new(AtomicBool::new(false));
        let mut rewrite = {
            let config = Arc::clone(&self.config);
            let content = Arc::clone(&self.content);
            let cancel = Arc::clone(&cancel_flag);
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                rewrite_entries(entries, &config, &content, &|| {
                    cancel.load(Ordering::Relaxed) || stop.load(Ordering::Relaxed)
                })
            })
        };

        let rewritten = loop {
            tokio::select! {
                joined = &mut rewrite => {
                    break joined.map_err(|e| task_failed(&Stage::Transforming, e))?
                }
                Some((index, result)) = fetches.next(), if !fetches.is_empty() => {
                    if let Err(e) = record_fetch(index, result, &locators, &mut fetched) {
                        stop.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }
        };
        let RewriteOutcome { entries, counts } = rewritten?;
        info!(
            relocated = counts.relocated,
            text_rewritten = counts.text_rewritten,
            references = counts.references,
            "entries rewritten"
        );

        stages.enter(Stage::Fetching);
        while let Some((index, result)) = fetches.next().await {
            record_fetch(index, result, &locators, &mut fetched)?;
            check_cancelled(&cancel_flag)?;
        }
        check_cancelled(&cancel_flag)?;

        let mut output_entries = entries;
        output_entries.reserve(fetched.len());
        for (aux, bytes) in self.config.auxiliaries.iter().zip(fetched) {
            let bytes = bytes.ok_or_else(|| RelocateError::FetchFailed {
                locator: aux.locator.to_string(),
                cause: FetchError::Task("fetch produced no result".to_string()),
            })?;
            debug!(name = %aux.dest_name, size = bytes.len(), "injecting auxiliary");
            output_entries.push(Entry::file(aux.dest_name.clone(), bytes));
        }
        let auxiliaries_injected = self.config.auxiliaries.len() as u64;

        stages.enter(Stage::Writing);
        let options = self.config.options.clone();
        let archive = tokio::task::spawn_blocking(move || write_archive(output_entries, &options))
            .await
            .map_err(|e| task_failed(&Stage::Writing, e))??;

        let stats = TransformStats {
            entries_read,
            entries_relocated: counts.relocated,
            text_entries_rewritten: counts.text_rewritten,
            references_rewritten: counts.references,
            auxiliaries_injected,
            bytes_written: archive.len() as u64,
            duration: start_time.elapsed(),
        };
        info!(bytes = stats.bytes_written, "archive written");

        Ok(TransformOutput { archive, stats })
    }
}

/// Tracks the current stage and forwards every transition to the observer.
struct StageTracker<'a> {
    current: Stage,
    on_stage: &'a StageCallback<'a>,
}

impl<'a> StageTracker<'a> {
    fn new(on_stage: &'a StageCallback<'a>) -> Self {
        Self {
            current: Stage::Idle,
            on_stage,
        }
    }

    fn enter(&mut self, next: Stage) {
        // Done and Failed are terminal
        if matches!(self.current, Stage::Done | Stage::Failed(_)) {
            return;
        }
        debug!(from = %self.current, to = %next, "stage transition");
        (self.on_stage)(&next);
        self.current = next;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RewriteCounts {
    relocated: u64,
    text_rewritten: u64,
    references: u64,
}

struct RewriteOutcome {
    entries: Vec<Entry>,
    counts: RewriteCounts,
}

/// Map every entry through classification, path rewriting and (for text)
/// content rewriting. Order is preserved; each entry is handled on its own.
fn rewrite_entries(
    entries: Vec<Entry>,
    config: &RelocateConfig,
    content: &ContentRewriter,
    should_stop: &dyn Fn() -> bool,
) -> Result<RewriteOutcome, RelocateError> {
    let mut counts = RewriteCounts::default();
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        if should_stop() {
            return Err(RelocateError::Cancelled);
        }

        let relocated = entry.path.starts_with(config.rule.source_prefix());
        let (rewritten, replacements) = rewrite_entry(entry, config, content)?;
        if relocated {
            counts.relocated += 1;
        }
        if replacements > 0 {
            counts.text_rewritten += 1;
            counts.references += replacements as u64;
        }
        out.push(rewritten);
    }

    Ok(RewriteOutcome {
        entries: out,
        counts,
    })
}

/// Rewrite one entry, returning the new entry and the number of references
/// replaced in its content.
pub(crate) fn rewrite_entry(
    entry: Entry,
    config: &RelocateConfig,
    content: &ContentRewriter,
) -> Result<(Entry, usize), RelocateError> {
    let kind = classify(&entry, &config.text_extensions);
    let path = rewrite_path(&entry.path, &config.rule);

    let (payload, replacements) = match kind {
        EntryKind::Directory => (Vec::new(), 0),
        EntryKind::Binary => (entry.payload, 0),
        EntryKind::Text => {
            let text = String::from_utf8(entry.payload).map_err(|_| RelocateError::Decode {
                path: entry.path.clone(),
                charset: "UTF-8",
            })?;
            let rewritten = content.rewrite(&text);
            (rewritten.text.into_bytes(), rewritten.replacements)
        }
    };

    debug!(from = %entry.path, to = %path, %kind, replacements, "rewrote entry");

    Ok((
        Entry {
            path,
            is_directory: kind == EntryKind::Directory,
            payload,
            unix_mode: entry.unix_mode,
            compressed_size: entry.compressed_size,
        },
        replacements,
    ))
}

fn record_fetch(
    index: usize,
    result: Result<Vec<u8>, FetchError>,
    locators: &[url::Url],
    fetched: &mut [Option<Vec<u8>>],
) -> Result<(), RelocateError> {
    match result {
        Ok(bytes) => {
            fetched[index] = Some(bytes);
            Ok(())
        }
        Err(cause) => Err(RelocateError::FetchFailed {
            locator: locators[index].to_string(),
            cause,
        }),
    }
}

fn check_cancelled(cancel_flag: &AtomicBool) -> Result<(), RelocateError> {
    if cancel_flag.load(Ordering::Relaxed) {
        return Err(RelocateError::Cancelled);
    }
    Ok(())
}

/// Map a blocking worker that panicked or was cancelled onto the error of
/// the stage it was running.
fn task_failed(stage: &Stage, e: JoinError) -> RelocateError {
    let message = format!("{} task failed: {}", stage, e);
    match stage {
        Stage::Reading => RelocateError::CorruptArchive(message),
        Stage::Writing => RelocateError::WriteFailed(message),
        _ => RelocateError::Io(std::io::Error::other(message)),
    }
}
