//! Asynchronous delivery of task lifecycle callbacks.
//!
//! The runner only enqueues; a dedicated thread drains the queue and invokes
//! callbacks with no runner lock held, so callbacks may call back into the
//! runner.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::core::error::CallbackError;
use crate::core::schedule::EventType;
use crate::core::task::{panic_message, TaskRef};

/// Queued lifecycle event.
#[derive(Debug, Clone)]
pub(crate) struct Notification {
    pub(crate) task: TaskRef,
    pub(crate) event: EventType,
}

pub(crate) type NotificationSender = Sender<Notification>;

/// Invoked when a START callback asks for its task to be withdrawn.
pub(crate) type AbortHandler = Box<dyn Fn(&TaskRef) + Send>;

/// Spawn the notifier thread. It exits once every sender is dropped and the
/// queue is drained.
pub(crate) fn spawn_notifier(
    rx: Receiver<Notification>,
    on_abort: AbortHandler,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("window-sched-notifier".into())
        .spawn(move || {
            debug!("notifier started");
            while let Ok(notification) = rx.recv() {
                deliver(&notification, &*on_abort);
            }
            debug!("notifier exiting");
        })
}

/// Run one callback, containing its failures.
pub(crate) fn deliver(notification: &Notification, on_abort: &dyn Fn(&TaskRef)) {
    let Notification { task, event } = notification;
    if let Some(callback) = task.callback() {
        match panic::catch_unwind(AssertUnwindSafe(|| callback.task_event(task, *event))) {
            Ok(Ok(())) => {}
            Ok(Err(CallbackError::Abort)) if *event == EventType::Start => {
                warn!(task = %task, "callback aborted task at start");
                on_abort(task);
            }
            Ok(Err(e)) => {
                warn!(task = %task, ?event, error = %e, "task callback failed");
            }
            Err(payload) => {
                error!(
                    task = %task,
                    ?event,
                    panic = %panic_message(payload.as_ref()),
                    "task callback panicked"
                );
            }
        }
    }
    if *event == EventType::Finish {
        task.clear_callback();
    }
}
