//! Supervision (§4.8): every client actor and server acceptor is tracked by
//! one of these so the process can shut them all down together. Restart
//! policy is transient — nothing here ever restarts a dead task; a client
//! actor is recreated only by the dispatcher, on the next call or cast that
//! needs it.

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const SHUTDOWN_CAPACITY: usize = 16;

/// One supervisor per side (client actors vs. server acceptors). Holds a
/// broadcast channel every supervised task selects on, plus the join
/// handles needed to wait for clean shutdown.
pub struct Supervisor {
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(SHUTDOWN_CAPACITY);
        Self {
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Registers a task's handle so `shutdown` can observe it finish.
    /// Opportunistically drops handles for tasks that already completed, so
    /// this doesn't grow unbounded over a long-lived process.
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Signals every supervised task to terminate. Does not wait for them —
    /// callers that need that should await the handles themselves.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

pub type ClientSupervisor = Supervisor;
pub type ServerSupervisor = Supervisor;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_wakes_subscribers() {
        let supervisor = Supervisor::new();
        let mut rx = supervisor.shutdown_signal();
        supervisor.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
