use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::run::RunTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Checking,
    Downloading,
    Verifying,
    Complete,
}

impl Stage {
    /// Share of the overall bar each stage occupies.
    pub fn span(self) -> (f64, f64) {
        match self {
            Stage::Checking => (0.0, 10.0),
            Stage::Downloading => (10.0, 90.0),
            Stage::Verifying => (90.0, 100.0),
            Stage::Complete => (100.0, 100.0),
        }
    }

    /// Map a fraction of this stage onto the overall percentage.
    pub fn percent(self, fraction: f64) -> f64 {
        let (start, end) = self.span();
        start + (end - start) * fraction.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub stage: Stage,
    pub percent_complete: f64,
    pub current_file_name: Option<String>,
    pub total_files: usize,
    pub downloaded_files: usize,
}

/// Publishes one run's progress on a channel.
///
/// Percentages never go backwards within a run and `Complete` is published
/// at most once. A run made of several phases draws each on its own slice of
/// the bar (see [`ProgressReporter::phase`]). Once the run's ticket is
/// superseded, events are silently dropped. A closed receiver is not an
/// error: downloads keep going when nobody is watching.
pub struct ProgressReporter {
    sender: Option<UnboundedSender<Progress>>,
    ticket: Option<RunTicket>,
    last_percent: Mutex<f64>,
    window: Mutex<(f64, f64)>,
    completed: AtomicBool,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<Progress>, ticket: Option<RunTicket>) -> Self {
        Self {
            sender: Some(sender),
            ticket,
            last_percent: Mutex::new(0.0),
            window: Mutex::new((0.0, 100.0)),
            completed: AtomicBool::new(false),
        }
    }

    pub fn channel(ticket: Option<RunTicket>) -> (Self, UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, ticket), rx)
    }

    /// A reporter nobody listens to.
    pub fn silent() -> Self {
        Self {
            sender: None,
            ticket: None,
            last_percent: Mutex::new(0.0),
            window: Mutex::new((0.0, 100.0)),
            completed: AtomicBool::new(false),
        }
    }

    pub fn ticket(&self) -> Option<&RunTicket> {
        self.ticket.as_ref()
    }

    /// Draw the following stages on `start..end` of the overall bar. A phase
    /// ending below 100% reports its own completion as `Verifying`, leaving
    /// `Complete` to the last phase.
    pub fn phase(&self, start: f64, end: f64) {
        let start = start.clamp(0.0, 100.0);
        let end = end.clamp(start, 100.0);
        *self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = (start, end);
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn publish(&self, mut progress: Progress) {
        if let Some(ticket) = &self.ticket {
            if !ticket.is_current() {
                return;
            }
        }
        if progress.stage == Stage::Complete && self.completed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut last = self
                .last_percent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let percent = progress.percent_complete.clamp(0.0, 100.0).max(*last);
            *last = percent;
            progress.percent_complete = percent;
        }

        if let Some(sender) = &self.sender {
            let _ = sender.send(progress);
        }
    }

    pub fn stage(
        &self,
        stage: Stage,
        fraction: f64,
        current_file_name: Option<String>,
        total_files: usize,
        downloaded_files: usize,
    ) {
        let (start, end) = *self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let percent_complete = start + (end - start) * stage.percent(fraction) / 100.0;
        let stage = if stage == Stage::Complete && end < 100.0 {
            Stage::Verifying
        } else {
            stage
        };
        self.publish(Progress {
            stage,
            percent_complete,
            current_file_name,
            total_files,
            downloaded_files,
        });
    }
}
