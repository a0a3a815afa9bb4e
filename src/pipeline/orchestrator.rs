use crate::error::PipelineError;
use crate::filter::{Filter, FilterCompiler};
use crate::pipeline::cancel::CancelFlag;
use crate::pipeline::config::{PipelineConfig, RecordErrorPolicy};
use crate::pipeline::parallel::evaluate_batch;
use crate::progress::{ProgressSnapshot, ProgressState};
use crate::project::{ProjectionSchema, Projector};
use crate::sink::{ResultSink, SinkStats};
use crate::stream::RecordStream;
use crate::types::{CardRecord, StreamEvent};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Reading,
    Filtering,
    Projecting,
    Writing,
    Flushing,
    Done,
    Failed,
}

/// Knobs that shape a run but not its semantics
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub drop_empty_sets: bool,
    pub on_record_error: RecordErrorPolicy,
    pub buffer_size: usize,
    pub workers: usize,
    pub batch_size: usize,
    /// Events buffered between the reader thread and the pipeline
    pub stream_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            drop_empty_sets: false,
            on_record_error: RecordErrorPolicy::Abort,
            buffer_size: ResultSink::<Vec<u8>>::DEFAULT_BUFFER_SIZE,
            workers: 1,
            batch_size: 256,
            stream_capacity: RecordStream::DEFAULT_CAPACITY,
        }
    }
}

impl From<&PipelineConfig> for RunOptions {
    fn from(config: &PipelineConfig) -> Self {
        RunOptions {
            drop_empty_sets: config.drop_empty_sets,
            on_record_error: config.on_record_error,
            buffer_size: config.buffer_size,
            workers: config.workers,
            batch_size: config.batch_size,
            ..RunOptions::default()
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub progress: ProgressSnapshot,
    pub sets_written: u64,
    pub sets_dropped: u64,
    pub cards_written: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(progress: ProgressSnapshot, stats: SinkStats, elapsed: Duration) -> Self {
        RunSummary {
            progress,
            sets_written: stats.sets_written,
            sets_dropped: stats.sets_dropped,
            cards_written: stats.cards_written,
            elapsed,
        }
    }
}

/// Drives records from a reader through filter and projection into a sink.
///
/// The filter is compiled before a `Pipeline` exists, so a bad filter spec
/// fails before a single byte of input is read.
pub struct Pipeline {
    filter: Filter,
    projector: Projector,
    options: RunOptions,
    progress: Arc<ProgressState>,
    cancel: CancelFlag,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(filter: Filter, projector: Projector) -> Self {
        Pipeline {
            filter,
            projector,
            options: RunOptions::default(),
            progress: Arc::new(ProgressState::new()),
            cancel: CancelFlag::new(),
            state: PipelineState::Idle,
        }
    }

    /// Compile the configured filter and load the configured projection
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let filter = match &config.filter {
            Some(source) => FilterCompiler::default().compile(&source.load()?)?,
            None => Filter::pass_all(),
        };
        let schema = match &config.projection {
            Some(source) => source.load()?,
            None => ProjectionSchema::pass_through(),
        };
        let mut projector = Projector::new(schema);
        if let Some(languages) = &config.foreign_languages {
            projector = projector.with_languages(languages.iter().cloned());
        }

        Ok(Self::new(filter, projector).with_options(RunOptions::from(config)))
    }

    /// Share an existing progress object, e.g. with a reporter thread
    pub fn with_progress(mut self, progress: Arc<ProgressState>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn progress(&self) -> Arc<ProgressState> {
        Arc::clone(&self.progress)
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Read a whole dataset from `reader` and write the surviving, projected
    /// cards to `writer`.
    ///
    /// Progress and the cancel flag are cleared on entry, so a cancellation
    /// only stops the run in progress.
    pub fn run<R, W>(&mut self, reader: R, writer: W) -> Result<RunSummary, PipelineError>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        self.progress.reset();
        self.cancel.reset();
        self.state = PipelineState::Idle;
        info!(
            pass_all = self.filter.is_pass_all(),
            projected_fields = self.projector.schema().fields().len(),
            workers = self.options.workers,
            "starting run"
        );

        let started = Instant::now();
        match self.run_inner(reader, writer) {
            Ok(stats) => {
                self.transition(PipelineState::Done);
                let summary = RunSummary::new(self.progress.snapshot(), stats, started.elapsed());
                info!(
                    records_seen = summary.progress.records_seen,
                    records_matched = summary.progress.records_matched,
                    records_skipped = summary.progress.records_skipped,
                    sets_written = summary.sets_written,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                self.transition(PipelineState::Failed);
                if err.is_cancelled() {
                    warn!("{}", err);
                } else {
                    error!(kind = ?err.kind(), "run failed: {}", err);
                }
                Err(err)
            }
        }
    }

    fn run_inner<R, W>(&mut self, reader: R, writer: W) -> Result<SinkStats, PipelineError>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let stream = RecordStream::with_capacity(
            reader,
            Arc::clone(&self.progress),
            self.options.stream_capacity,
        );
        let mut sink =
            ResultSink::with_options(writer, self.options.buffer_size, self.options.drop_empty_sets);
        let mut batch: Vec<CardRecord> = Vec::new();

        for item in stream {
            self.transition(PipelineState::Reading);
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    records_seen: self.progress.records_seen(),
                });
            }

            match item? {
                StreamEvent::Meta(meta) => {
                    self.transition(PipelineState::Writing);
                    sink.write_meta(&meta).map_err(PipelineError::SinkWrite)?;
                }
                StreamEvent::SetStart { set_code, block } => {
                    debug!(set = %set_code, "set started");
                    self.transition(PipelineState::Writing);
                    sink.open_set(&set_code, block.as_ref())
                        .map_err(PipelineError::SinkWrite)?;
                }
                StreamEvent::Card(record) => {
                    if self.options.workers > 1 {
                        batch.push(record);
                        if batch.len() >= self.options.batch_size {
                            self.flush_batch(&mut batch, &mut sink)?;
                        }
                    } else {
                        self.process_record(record, &mut sink)?;
                    }
                }
                StreamEvent::Rejected(err) => {
                    self.progress.record_seen();
                    match self.options.on_record_error {
                        RecordErrorPolicy::Abort => return Err(err.into()),
                        RecordErrorPolicy::Skip => {
                            warn!("skipping record: {}", err);
                            self.progress.record_skipped();
                        }
                    }
                }
                StreamEvent::SetEnd {
                    set_code,
                    block,
                    cards,
                } => {
                    self.flush_batch(&mut batch, &mut sink)?;
                    self.transition(PipelineState::Writing);
                    sink.close_set(block.as_ref()).map_err(PipelineError::SinkWrite)?;
                    debug!(set = %set_code, cards, "set finished");
                }
            }
        }

        self.transition(PipelineState::Flushing);
        let (stats, _) = sink.finish().map_err(PipelineError::SinkWrite)?;
        Ok(stats)
    }

    fn process_record<W: Write>(
        &mut self,
        record: CardRecord,
        sink: &mut ResultSink<W>,
    ) -> Result<(), PipelineError> {
        self.progress.record_seen();

        self.transition(PipelineState::Filtering);
        if !self.filter.matches(&record.card)? {
            return Ok(());
        }
        self.progress.record_matched();

        self.transition(PipelineState::Projecting);
        let card = self.projector.project(record.card);

        self.transition(PipelineState::Writing);
        sink.write_card(&card).map_err(PipelineError::SinkWrite)
    }

    fn flush_batch<W: Write>(
        &mut self,
        batch: &mut Vec<CardRecord>,
        sink: &mut ResultSink<W>,
    ) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.transition(PipelineState::Filtering);
        let records = std::mem::take(batch);
        let results = evaluate_batch(
            &self.filter,
            &self.projector,
            &self.progress,
            records,
            self.options.workers,
        )?;

        self.transition(PipelineState::Writing);
        for card in results.into_iter().flatten() {
            sink.write_card(&card).map_err(PipelineError::SinkWrite)?;
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "pipeline state");
            self.state = next;
        }
    }
}
