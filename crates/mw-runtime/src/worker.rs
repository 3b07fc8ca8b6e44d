use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::error::RuntimeError;
use crate::events::{EventBus, JsonlEventBus};
use crate::queue::{DirectoryQueue, RunQueue};
use crate::run::{OutputPaths, RunContext, handle_run_request};
use crate::store::{LocalFsStore, SeriesStore};

/// Pulls run requests off a queue and executes them one at a time.
pub struct Worker {
    queue: Box<dyn RunQueue>,
    store: Box<dyn SeriesStore>,
    events: Box<dyn EventBus>,
    clock: Box<dyn Clock>,
}

impl Worker {
    #[must_use]
    pub fn new(
        queue: Box<dyn RunQueue>,
        store: Box<dyn SeriesStore>,
        events: Box<dyn EventBus>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            store,
            events,
            clock,
        }
    }

    /// Directory queue, local filesystem store and JSONL event log, as
    /// configured.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let queue = DirectoryQueue::open(&config.queue_dir)?;
        let events = JsonlEventBus::open(&config.events_path)?;
        Ok(Self::new(
            Box::new(queue),
            Box::new(LocalFsStore::new(&config.storage_root)),
            Box::new(events),
            Box::new(SystemClock),
        ))
    }

    fn context(&self) -> RunContext<'_> {
        RunContext {
            store: self.store.as_ref(),
            events: self.events.as_ref(),
            clock: self.clock.as_ref(),
        }
    }

    /// Handle at most one message. Returns `false` when the queue was empty.
    ///
    /// The message is acknowledged whether the run succeeds or fails; runs
    /// whose marker already exists are acknowledged without running.
    pub fn process_next(&self) -> Result<bool, RuntimeError> {
        let Some(delivery) = self.queue.receive()? else {
            return Ok(false);
        };
        let request = &delivery.request;

        let marker = OutputPaths::marker_for(&request.output.base_path, &request.run_id);
        match self.store.run_marker_exists(&marker) {
            Ok(true) => {
                info!(
                    run_id = %request.run_id,
                    metric_code = %request.metric_code,
                    "run_already_completed"
                );
                self.queue.ack(&delivery.receipt)?;
                return Ok(true);
            }
            Ok(false) => {}
            Err(err) => {
                warn!(run_id = %request.run_id, error = %err, "run_marker_check_failed");
            }
        }

        let outcome = handle_run_request(request, &self.context());
        self.queue.ack(&delivery.receipt)?;
        outcome?;
        Ok(true)
    }

    /// Process messages until the queue is empty. Returns how many were handled.
    pub fn run_until_idle(&self) -> Result<usize, RuntimeError> {
        let mut handled = 0;
        while self.process_next()? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Poll until `should_stop` returns true, sleeping `poll_interval` when
    /// idle or after an error. Returns how many messages were handled.
    pub fn run_polling(&self, poll_interval: Duration, should_stop: impl Fn() -> bool) -> usize {
        let mut handled = 0;
        while !should_stop() {
            match self.process_next() {
                Ok(true) => handled += 1,
                Ok(false) => {
                    debug!("worker_idle");
                    std::thread::sleep(poll_interval);
                }
                Err(err) => {
                    error!(error = %err, error_code = err.code().as_str(), "main_loop_error");
                    std::thread::sleep(poll_interval);
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use mw_types::parse_obs_time;

    use super::Worker;
    use crate::clock::FixedClock;
    use crate::events::InMemoryEventBus;
    use crate::queue::InMemoryQueue;
    use crate::store::InMemoryStore;

    #[test]
    fn polling_stops_when_asked() {
        let worker = Worker::new(
            Box::new(InMemoryQueue::new()),
            Box::new(InMemoryStore::new()),
            Box::new(InMemoryEventBus::new()),
            Box::new(FixedClock(parse_obs_time("2024-01-01").expect("ts"))),
        );

        let polls = Cell::new(0);
        let handled = worker.run_polling(Duration::from_millis(1), || {
            polls.set(polls.get() + 1);
            polls.get() > 3
        });
        assert_eq!(handled, 0);
        assert_eq!(polls.get(), 4);
        assert_eq!(worker.run_until_idle().expect("idle"), 0);
    }
}
