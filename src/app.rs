use std::io::{self, Write};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::warn;

use crate::config::RunConfig;
use crate::domain::{ContentReference, FailureDetail, IdExtractor};
use crate::downloader::{BatchPlan, Downloader};
use crate::error::ArchiveError;
use crate::export::{self, group_by_collection, write_url_list};
use crate::index::{build_index, write_index};
use crate::runner::CommandRunner;
use crate::session::{SessionOutcome, SessionRecorder};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Prints `[*] message` notices to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let mut stdout = io::stdout().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stdout,
                "[*] {} ({:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => writeln!(stdout, "[*] {}", event.message),
        };
    }
}

/// One collection's references and where they go on disk.
#[derive(Debug, Clone)]
pub struct PlannedBatch {
    pub plan: BatchPlan,
    pub refs: Vec<ContentReference>,
}

pub struct App<R: CommandRunner> {
    config: RunConfig,
    ids: IdExtractor,
    downloader: Downloader<R>,
}

impl<R: CommandRunner> App<R> {
    pub fn new(config: RunConfig, runner: R) -> Self {
        Self {
            config,
            ids: IdExtractor::new(),
            downloader: Downloader::new(runner),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        self.downloader.runner()
    }

    pub fn load_references(&self, sink: &dyn ProgressSink) -> Result<Vec<ContentReference>, ArchiveError> {
        let refs = export::read_export(
            &self.config.export_file,
            self.config.include_liked,
            &self.ids,
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "Loaded {} video entries from '{}'",
                refs.len(),
                self.config.export_file.display()
            ),
            elapsed: None,
        });
        Ok(refs)
    }

    /// Organized: one batch per collection in first-seen order. Flat: a
    /// single batch with everything.
    pub fn plan(&self, refs: &[ContentReference]) -> Vec<PlannedBatch> {
        if self.config.organize_by_collection {
            group_by_collection(refs)
                .into_iter()
                .map(|(collection, refs)| PlannedBatch {
                    plan: BatchPlan::organized(&self.config, &collection),
                    refs,
                })
                .collect()
        } else {
            vec![PlannedBatch {
                plan: BatchPlan::flat(&self.config),
                refs: refs.to_vec(),
            }]
        }
    }

    pub fn write_url_lists(
        &self,
        batches: &[PlannedBatch],
        sink: &dyn ProgressSink,
    ) -> Result<(), ArchiveError> {
        for batch in batches {
            write_url_list(batch.plan.list_path.as_std_path(), &batch.refs)?;
            sink.event(ProgressEvent {
                message: format!(
                    "Extracted {} video URLs to '{}'",
                    batch.refs.len(),
                    batch.plan.list_path
                ),
                elapsed: None,
            });
        }
        Ok(())
    }

    /// Downloads every batch in order and indexes each one as it finishes.
    /// Item failures end up in the outcome; nothing here aborts the session.
    pub fn download(&mut self, batches: &[PlannedBatch], sink: &dyn ProgressSink) -> SessionOutcome {
        let mut recorder = SessionRecorder::start();
        for batch in batches {
            sink.event(ProgressEvent {
                message: format!("Processing collection: {}", batch.plan.label),
                elapsed: None,
            });
            let started = Instant::now();
            let outcome =
                self.downloader
                    .run_batch(&batch.plan, &batch.refs, &self.config, sink);
            sink.event(ProgressEvent {
                message: format!("Finished {outcome}"),
                elapsed: Some(started.elapsed()),
            });
            self.index_batch(batch, &outcome.failures, sink);
            recorder.record(outcome);
        }
        recorder.finish()
    }

    /// Regenerates indexes from metadata already on disk.
    pub fn rebuild_indexes(&self, batches: &[PlannedBatch], sink: &dyn ProgressSink) -> usize {
        batches
            .iter()
            .filter(|batch| self.index_batch(batch, &[], sink))
            .count()
    }

    fn index_batch(
        &self,
        batch: &PlannedBatch,
        failures: &[FailureDetail],
        sink: &dyn ProgressSink,
    ) -> bool {
        let name = self.index_name(&batch.plan);
        let written = build_index(&batch.plan.dir, &name, &batch.refs, failures, Local::now())
            .and_then(|index| write_index(&batch.plan.dir, &index));
        match written {
            Ok(()) => {
                sink.event(ProgressEvent {
                    message: format!("Generated index.html and index.json for {name}"),
                    elapsed: None,
                });
                true
            }
            Err(err) => {
                warn!(collection = %name, "{err}");
                false
            }
        }
    }

    // Flat output is named after the working directory itself.
    fn index_name(&self, plan: &BatchPlan) -> String {
        if self.config.organize_by_collection {
            return plan.label.clone();
        }
        plan.dir
            .canonicalize_utf8()
            .ok()
            .as_deref()
            .and_then(|dir| dir.file_name())
            .map(str::to_string)
            .unwrap_or_else(|| plan.label.clone())
    }
}
