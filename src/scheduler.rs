use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Timer surface the quiz session drives. At most one timer of each kind is
/// live; starting a new one replaces the previous one of that kind and
/// stopping is idempotent.
pub trait Scheduler {
    fn start_repeating(&mut self, period: Duration);
    fn stop_repeating(&mut self);
    fn start_once(&mut self, delay: Duration);
    fn cancel_once(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Repeating,
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    generation: u64,
}

/// Tokio-backed scheduler. Events are delivered over a channel; each carries
/// the generation of the timer that produced it, so events queued before a
/// stop or a replacement fail the [`TokioScheduler::is_live`] check and are
/// never acted upon.
pub struct TokioScheduler {
    tx: UnboundedSender<TimerEvent>,
    repeating: Option<JoinHandle<()>>,
    once: Option<JoinHandle<()>>,
    repeating_generation: u64,
    once_generation: u64,
}

impl TokioScheduler {
    pub fn new() -> (Self, UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                tx,
                repeating: None,
                once: None,
                repeating_generation: 0,
                once_generation: 0,
            },
            rx,
        )
    }

    pub fn is_live(&self, event: &TimerEvent) -> bool {
        match event.kind {
            TimerKind::Repeating => {
                self.repeating.is_some() && event.generation == self.repeating_generation
            }
            TimerKind::Once => self.once.is_some() && event.generation == self.once_generation,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start_repeating(&mut self, period: Duration) {
        self.stop_repeating();
        self.repeating_generation += 1;
        let generation = self.repeating_generation;
        let tx = self.tx.clone();
        self.repeating = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tx
                    .send(TimerEvent {
                        kind: TimerKind::Repeating,
                        generation,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    fn stop_repeating(&mut self) {
        if let Some(task) = self.repeating.take() {
            task.abort();
        }
    }

    fn start_once(&mut self, delay: Duration) {
        self.cancel_once();
        self.once_generation += 1;
        let generation = self.once_generation;
        let tx = self.tx.clone();
        self.once = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerEvent {
                kind: TimerKind::Once,
                generation,
            });
        }));
    }

    fn cancel_once(&mut self) {
        if let Some(task) = self.once.take() {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.stop_repeating();
        self.cancel_once();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Scheduler;
    use std::time::Duration;

    /// Deterministic stand-in for driving the session from tests.
    #[derive(Debug, Default)]
    pub(crate) struct ManualScheduler {
        pub repeating: Option<Duration>,
        pub once: Option<Duration>,
        pub repeating_starts: usize,
        pub once_starts: usize,
    }

    impl Scheduler for ManualScheduler {
        fn start_repeating(&mut self, period: Duration) {
            self.repeating = Some(period);
            self.repeating_starts += 1;
        }

        fn stop_repeating(&mut self) {
            self.repeating = None;
        }

        fn start_once(&mut self, delay: Duration) {
            self.once = Some(delay);
            self.once_starts += 1;
        }

        fn cancel_once(&mut self) {
            self.once = None;
        }
    }
}
