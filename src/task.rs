use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::Notify, task::JoinHandle, time::sleep};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("invalid arg, start delay and interval should be greater than 0")]
    InvalidSchedule,
}

/// The body of one scheduled invocation. Errors are caught and logged by the
/// task; they never stop the schedule.
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn tick(&self) -> anyhow::Result<()>;
}

/// A self-rescheduling timer task.
///
/// At most one handler invocation is in flight or scheduled at a time: the
/// next invocation is scheduled only after the previous one completes,
/// success or failure. `stop` cancels a pending timer but never interrupts a
/// handler that is already executing.
pub struct IntervalTask {
    name: String,
    start_delay: Duration,
    interval: Duration,
    handler: Arc<dyn TickHandler>,
    stopped: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalTask {
    pub fn new(
        start_delay: Duration,
        interval: Duration,
        name: impl Into<String>,
        handler: Arc<dyn TickHandler>,
    ) -> Result<Self, TaskError> {
        if start_delay.is_zero() || interval.is_zero() {
            return Err(TaskError::InvalidSchedule);
        }
        Ok(Self {
            name: name.into(),
            start_delay,
            interval,
            handler,
            stopped: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) {
        info!(task = %self.name, "task started");

        let name = self.name.clone();
        let handler = self.handler.clone();
        let stopped = self.stopped.clone();
        let stop_signal = self.stop_signal.clone();
        let start_delay = self.start_delay;
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut delay = start_delay;
            loop {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop_signal.notified() => break,
                }
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = handler.tick().await {
                    error!(task = %name, error = %format!("{e:#}"), "unexpected error running task");
                }
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                delay = interval;
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Idempotent. Cancels a pending timer; an in-flight handler finishes on
    /// its own and will not reschedule once it observes the stopped flag.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(task = %self.name, "task stopped");
        self.stop_signal.notify_waiters();
    }
}
