//! Running a match on a background thread.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::events::PipelineEvent;
use super::run::{MatchRun, RunState};

/// Drive `run` on a worker thread, forwarding its events over a channel.
///
/// Dropping the receiver stops the run at its next boundary. The join
/// handle yields the final state.
pub fn spawn_run(mut run: MatchRun) -> (Receiver<PipelineEvent>, JoinHandle<RunState>) {
    let (tx, rx) = mpsc::channel();
    let stop = run.stop_handle();

    let handle = thread::spawn(move || {
        for event in run.by_ref() {
            if tx.send(event).is_err() && !stop.is_stopped() {
                debug!("Event receiver dropped, stopping run");
                stop.stop();
            }
        }
        run.state()
    });

    (rx, handle)
}
