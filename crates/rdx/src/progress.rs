//! 📊 progress.rs — "Are we there yet?" — every migration, every index, forever.
//!
//! 🚀 The reindexer does not draw anything. It drops [`ProgressEvent`]s into a small
//! bounded channel through a [`ProgressReporter`] it was handed, and moves on without
//! waiting. Somebody else (usually [`spawn_progress_display`]) drains the channel into a
//! progress bar with a table so comfy it has lumbar support.
//!
//! ⚠️ Events are best-effort. Channel full? Dropped. Nobody listening? Dropped. Progress
//! carries no correctness obligation, so never count anything off of it.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, TrySendError};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, trace};

use crate::common::MigrationPhase;
use crate::reindexer::MigrationResult;

// -- 📏 one mebibyte — not a megabyte, pedants. there's a difference and I will die on this hill.
const MIB: u64 = 1024 * 1024;

/// 📡 Something worth telling a human about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// 🚦 An index moved into a new phase.
    PhaseEntered { index: String, phase: MigrationPhase },
    /// 🔢 The source count is in. Now we know how far there is to go.
    SourceCounted { index: String, count: u64 },
    /// 📦 One scroll page made it to the destination.
    PageWritten {
        index: String,
        page_number: u64,
        documents: usize,
        batches: usize,
        bytes: usize,
    },
    /// ✅ An index is done.
    IndexFinished { result: MigrationResult },
    /// 💀 An index failed while in `phase`. `cause` is the rendered error chain.
    Failed {
        index: String,
        phase: MigrationPhase,
        cause: String,
    },
}

/// 📣 The sink the reindexer shouts into. Cheap to clone, never blocks, never fails.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressReporter {
    /// 🔧 A reporter plus the receiving end of its bounded queue. Capacity 0 is bumped to 1.
    pub fn channel(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// 🙈 A reporter that reports to no one. Zen.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 📡 Fire and forget. A full or closed queue drops the event on the floor.
    pub fn emit(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!("📉 progress queue full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                trace!("📉 nobody is listening for progress anymore");
            }
        }
    }
}

/// 📦 Bytes into something a human can read. Because "1073741824 bytes" is a war crime in a UI.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        // -- 🐛 raw bytes mode. small indices need love too.
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000 docs" → "1,000,000 docs" — you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 Throughput at this very moment. A speedometer, minus the ticket.
struct Rates {
    docs_per_sec: f64,
    mib_per_sec: f64,
    percent_per_sec: f64,
}

/// 📊 Tracks one index's migration: documents written against the source count, bytes
/// shipped, rates over a sliding 5-second window, and an ETA that assumes the future
/// looks like the past.
///
/// # Ancient Proverb
/// "He who reindexes without a progress bar, reindexes alone and in darkness."
pub(crate) struct ProgressMetrics {
    index: String,
    /// 🔢 documents the source claimed to have. 0 means "we'll find out together".
    source_count: u64,
    total_bytes: u64,
    total_docs: u64,
    pages: u64,
    progress_bar: ProgressBar,
    /// 🔄 (timestamp, bytes, docs). VecDeque because we pop from the front.
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("index", &self.index)
            .field("source_count", &self.source_count)
            .field("total_bytes", &self.total_bytes)
            .field("total_docs", &self.total_docs)
            .field("pages", &self.pages)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(index: String, source_count: u64) -> Self {
        let progress_bar = ProgressBar::new(source_count);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            index,
            source_count,
            total_bytes: 0,
            total_docs: 0,
            pages: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed in one written page.
    pub(crate) fn update(&mut self, bytes: u64, docs: u64) {
        self.total_bytes += bytes;
        self.total_docs += docs;
        self.pages += 1;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.total_docs);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 💀 Leave the bar where it died, for the post-mortem.
    pub(crate) fn abandon(&self) {
        self.progress_bar.abandon();
    }

    fn percent(&self) -> f64 {
        if self.source_count > 0 {
            (self.total_docs as f64 / self.source_count as f64) * 100.0
        } else {
            0.0
        }
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_docs));

        if let Some(&(oldest_time, oldest_bytes, oldest_docs)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let docs_delta = self.total_docs.saturating_sub(oldest_docs);
                let percent_delta = if self.source_count > 0 {
                    (docs_delta as f64 / self.source_count as f64) * 100.0
                } else {
                    0.0
                };
                return Rates {
                    docs_per_sec: docs_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                    percent_per_sec: percent_delta / elapsed,
                };
            }
        }

        // -- 💤 not enough elapsed time yet — zeros, and composure
        Rates {
            docs_per_sec: 0.0,
            mib_per_sec: 0.0,
            percent_per_sec: 0.0,
        }
    }

    /// 🎨 The table under the bar:
    /// ```text
    /// | index: <name> (page <n>)
    /// | [=====>----------]
    ///   <docs/s>     <docs / source count>
    ///   <MiB/s>      <bytes shipped>
    ///   <%/s>        <%>
    ///   <elapsed>    <remaining>
    /// ```
    fn render(&self, rates: Rates) {
        let percent = self.percent();
        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation. historically a bad assumption. fine for scrolls.
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(rates.docs_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Docs",
                format_number(self.total_docs),
                format_number(self.source_count)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(self.total_bytes)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} %/s", rates.percent_per_sec))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", percent)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar.set_message(format!(
            "index: {} (page {})\n{}",
            self.index, self.pages, table
        ));
    }
}

/// 🖥️ Drain progress events into a terminal bar until every reporter is dropped.
///
/// One bar per index, opened when the source count arrives and closed when the index
/// finishes or fails. Await the handle after dropping the reindexer to let the last
/// frame land.
pub fn spawn_progress_display(rx: Receiver<ProgressEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut current: Option<ProgressMetrics> = None;
        while let Ok(event) = rx.recv().await {
            match event {
                ProgressEvent::PhaseEntered { index, phase } => {
                    debug!("🚦 '{}' entered {}", index, phase);
                }
                ProgressEvent::SourceCounted { index, count } => {
                    current = Some(ProgressMetrics::new(index, count));
                }
                ProgressEvent::PageWritten {
                    index,
                    documents,
                    bytes,
                    ..
                } => {
                    let metrics = current.get_or_insert_with(|| ProgressMetrics::new(index, 0));
                    metrics.update(bytes as u64, documents as u64);
                }
                ProgressEvent::IndexFinished { .. } => {
                    if let Some(metrics) = current.take() {
                        metrics.finish();
                    }
                }
                ProgressEvent::Failed { .. } => {
                    if let Some(metrics) = current.take() {
                        metrics.abandon();
                    }
                }
            }
        }
    })
}
