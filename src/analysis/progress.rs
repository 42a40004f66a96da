use crate::model::{AnalysisStep, StepOutcome, StepStatus};
use chrono::Utc;
use tokio::sync::mpsc;

/// Progress notification emitted after every step transition. The engine
/// only writes these to a channel; rendering is the consumer's concern.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub step_name: String,
    pub step_index: usize,
    pub total_steps: usize,
    pub status: StepStatus,
    pub message: String,
}

/// Cloneable handle the pipeline emits progress through. A disabled
/// sender swallows events so headless runs pay nothing.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, step: AnalysisStep, status: StepStatus, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(ProgressEvent {
                step_name: step.name().to_string(),
                step_index: step.index(),
                total_steps: AnalysisStep::ALL.len(),
                status,
                message: message.into(),
            });
        }
    }
}

/// Records per-step status and timing for the run, emitting a progress
/// event on every transition.
pub struct StepTracker {
    outcomes: Vec<StepOutcome>,
    progress: ProgressSender,
}

impl StepTracker {
    pub fn new(progress: ProgressSender) -> Self {
        Self {
            outcomes: AnalysisStep::ALL.iter().map(|s| StepOutcome::pending(*s)).collect(),
            progress,
        }
    }

    fn outcome_mut(&mut self, step: AnalysisStep) -> &mut StepOutcome {
        self.outcomes
            .iter_mut()
            .find(|o| o.step == step)
            .expect("step outcomes cover the full pipeline")
    }

    pub fn start(&mut self, step: AnalysisStep) {
        let outcome = self.outcome_mut(step);
        outcome.status = StepStatus::Running;
        outcome.started_at = Some(Utc::now());
        self.progress.emit(step, StepStatus::Running, step.title());
    }

    pub fn succeed(&mut self, step: AnalysisStep, message: impl Into<String>) {
        self.finish(step, StepStatus::Succeeded, None, message.into());
    }

    pub fn fail(&mut self, step: AnalysisStep, error: impl Into<String>) {
        let error = error.into();
        self.finish(step, StepStatus::Failed, Some(error.clone()), error);
    }

    pub fn skip(&mut self, step: AnalysisStep, reason: impl Into<String>) {
        self.finish(step, StepStatus::Skipped, None, reason.into());
    }

    /// Skip every step that has not reached a terminal status yet.
    pub fn skip_remaining(&mut self, reason: &str) {
        for step in AnalysisStep::ALL {
            if !self.outcome_mut(step).status.is_terminal() {
                self.skip(step, reason);
            }
        }
    }

    pub fn record_item_errors(&mut self, step: AnalysisStep, errors: Vec<String>) {
        self.outcome_mut(step).item_errors = errors;
    }

    fn finish(
        &mut self,
        step: AnalysisStep,
        status: StepStatus,
        error: Option<String>,
        message: String,
    ) {
        let outcome = self.outcome_mut(step);
        let finished = Utc::now();
        outcome.status = status;
        outcome.finished_at = Some(finished);
        outcome.duration_ms = outcome
            .started_at
            .map(|started| (finished - started).num_milliseconds().max(0) as u64);
        outcome.error = error;
        self.progress.emit(step, status, message);
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == StepStatus::Succeeded)
    }

    pub fn into_outcomes(self) -> Vec<StepOutcome> {
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_running_then_terminal_events() {
        let (sender, mut rx) = ProgressSender::channel();
        let mut tracker = StepTracker::new(sender);

        tracker.start(AnalysisStep::ValidatePrerequisites);
        tracker.succeed(AnalysisStep::ValidatePrerequisites, "ok");

        let running = rx.recv().await.unwrap();
        assert_eq!(running.step_name, "validate-prerequisites");
        assert_eq!(running.step_index, 1);
        assert_eq!(running.total_steps, 6);
        assert_eq!(running.status, StepStatus::Running);

        let done = rx.recv().await.unwrap();
        assert_eq!(done.status, StepStatus::Succeeded);
    }

    #[test]
    fn skip_remaining_leaves_terminal_steps_alone() {
        let mut tracker = StepTracker::new(ProgressSender::disabled());
        tracker.start(AnalysisStep::ValidatePrerequisites);
        tracker.succeed(AnalysisStep::ValidatePrerequisites, "ok");
        tracker.start(AnalysisStep::ConnectWorkspace);
        tracker.fail(AnalysisStep::ConnectWorkspace, "forbidden");

        tracker.skip_remaining("aborted");
        let outcomes = tracker.into_outcomes();

        assert_eq!(outcomes[0].status, StepStatus::Succeeded);
        assert_eq!(outcomes[1].status, StepStatus::Failed);
        for outcome in &outcomes[2..] {
            assert_eq!(outcome.status, StepStatus::Skipped);
        }
    }

    #[test]
    fn failure_records_error_detail() {
        let mut tracker = StepTracker::new(ProgressSender::disabled());
        tracker.start(AnalysisStep::AnalyzeNetwork);
        tracker.fail(AnalysisStep::AnalyzeNetwork, "listing failed");

        let outcomes = tracker.into_outcomes();
        let outcome = &outcomes[2];
        assert_eq!(outcome.error.as_deref(), Some("listing failed"));
        assert!(outcome.duration_ms.is_some());
    }

    #[test]
    fn disabled_sender_drops_events_silently() {
        let sender = ProgressSender::disabled();
        sender.emit(AnalysisStep::GenerateReport, StepStatus::Running, "quiet");
    }
}
