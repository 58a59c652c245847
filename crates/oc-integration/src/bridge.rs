//! Error/recovery bridge between the execution thread and the host
//!
//! The execution thread never calls into host code directly. It posts a
//! [`HostEvent`] and, for errors, blocks on a one-shot reply channel until the
//! host thread has asked its [`Frontend`] whether to keep going.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use oc_core::{CoreError, ResultStatus};
use oc_rsx::LoadCallbackStage;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Host-side callbacks
pub trait Frontend {
    /// Ask whether emulation should continue after `kind`. `true` continues.
    fn on_error(&mut self, kind: CoreError, details: &str) -> bool;

    /// Disk resource loading progress
    fn on_progress(&mut self, _stage: LoadCallbackStage, _progress: usize, _max: usize) {}

    /// The session ended with a non-success status
    fn on_exit(&mut self, _status: ResultStatus) {}
}

/// Message posted from the execution thread
#[derive(Debug)]
pub enum HostEvent {
    Error {
        kind: CoreError,
        details: String,
        reply: Sender<bool>,
    },
    Progress {
        stage: LoadCallbackStage,
        progress: usize,
        max: usize,
    },
    Exit {
        status: ResultStatus,
    },
}

/// Execution-thread end of the bridge
#[derive(Debug, Clone)]
pub struct ErrorBridge {
    events: Sender<HostEvent>,
}

/// Host-thread end of the bridge
#[derive(Debug)]
pub struct HostLink {
    events: Receiver<HostEvent>,
}

/// Create a connected bridge pair
pub fn create_error_bridge() -> (ErrorBridge, HostLink) {
    let (tx, rx) = channel::unbounded();
    (ErrorBridge { events: tx }, HostLink { events: rx })
}

impl ErrorBridge {
    /// Ask the host whether to continue after `status`, blocking until it answers.
    ///
    /// Statuses without a dedicated kind are reported as [`CoreError::Unknown`].
    /// If the host end is gone the answer is "abort".
    pub fn escalate(&self, status: ResultStatus, details: &str) -> bool {
        let kind = CoreError::from_status(status);
        error!("Escalating {} to host: {}", kind, details);

        let (reply_tx, reply_rx) = channel::bounded(1);
        let event = HostEvent::Error {
            kind,
            details: details.to_string(),
            reply: reply_tx,
        };
        if self.events.send(event).is_err() {
            warn!("Host link closed, aborting after {}", kind);
            return false;
        }
        match reply_rx.recv() {
            Ok(resume) => {
                info!("Host chose to {} after {}", if resume { "continue" } else { "abort" }, kind);
                resume
            }
            Err(_) => {
                warn!("Host dropped the recovery request for {}", kind);
                false
            }
        }
    }

    /// Forward disk loading progress. Never blocks.
    pub fn report_progress(&self, stage: LoadCallbackStage, progress: usize, max: usize) {
        let _ = self.events.send(HostEvent::Progress { stage, progress, max });
    }

    /// Tell the host the session ended abnormally
    pub fn report_exit(&self, status: ResultStatus) {
        let _ = self.events.send(HostEvent::Exit { status });
    }
}

impl HostLink {
    /// Deliver one event to `frontend`
    pub fn dispatch(frontend: &mut dyn Frontend, event: HostEvent) {
        match event {
            HostEvent::Error { kind, details, reply } => {
                let resume = frontend.on_error(kind, &details);
                if reply.send(resume).is_err() {
                    debug!("Execution thread stopped waiting for recovery answer");
                }
            }
            HostEvent::Progress { stage, progress, max } => frontend.on_progress(stage, progress, max),
            HostEvent::Exit { status } => frontend.on_exit(status),
        }
    }

    /// Deliver every event already queued. Returns how many were handled.
    pub fn drain(&self, frontend: &mut dyn Frontend) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    Self::dispatch(frontend, event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Wait up to `timeout` for one event and deliver it.
    ///
    /// Returns `false` once every [`ErrorBridge`] has been dropped.
    pub fn poll(&self, frontend: &mut dyn Frontend, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                Self::dispatch(frontend, event);
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Serve events until `done` returns true, then deliver whatever is left
    pub fn serve_until(&self, frontend: &mut dyn Frontend, done: impl Fn() -> bool) {
        while !done() {
            if !self.poll(frontend, Duration::from_millis(10)) {
                return;
            }
        }
        self.drain(frontend);
    }
}
