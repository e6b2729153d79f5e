//! Receive gate.
//!
//! When armed, every `receive` parks after dequeuing its pending call until
//! test code hands it a signal. Handing over a signal is a rendezvous: the
//! signaling side resumes only after a parked `receive` has taken it.

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

type Permit = oneshot::Sender<()>;

/// Waiting side of the gate, owned by the connection.
#[derive(Debug)]
pub struct ReceiveGate {
    tx: mpsc::Sender<Permit>,
    rx: Mutex<mpsc::Receiver<Permit>>,
}

/// Signaling side of the gate, held by test code.
#[derive(Debug, Clone)]
pub struct ReceiveSignal {
    tx: mpsc::Sender<Permit>,
}

impl ReceiveGate {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Create a handle that releases parked receives.
    pub fn signal(&self) -> ReceiveSignal {
        ReceiveSignal {
            tx: self.tx.clone(),
        }
    }

    /// Park until a signal arrives.
    ///
    /// Waiters are served one at a time. There is no timeout.
    pub async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        debug!("Receive parked on gate");

        // Skip permits whose signaler gave up waiting. The gate keeps its own
        // sender alive, so the channel never closes.
        while let Some(permit) = rx.recv().await {
            if permit.send(()).is_ok() {
                break;
            }
        }
        debug!("Receive released by gate");
    }
}

impl Default for ReceiveGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveSignal {
    /// Release one parked receive, waiting until it has taken the signal.
    ///
    /// Returns false if the gate was dropped or the waiter went away before
    /// taking the signal.
    pub async fn release(&self) -> bool {
        let (permit, taken) = oneshot::channel();
        if self.tx.send(permit).await.is_err() {
            return false;
        }
        taken.await.is_ok()
    }
}
