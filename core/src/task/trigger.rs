//! Capacity-1 replace-on-full trigger channels — `spec.md` §4.1/§9: "pushing
//! to a full channel must be replaced by the new event, never queued to grow
//! unboundedly." Since every trigger here is a content-less marker, a
//! `try_send` that fails with `Full` already means an equivalent event is
//! pending — coalescing falls out for free, no drain-and-reinsert needed.

use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Fires the trigger. Never blocks; a full channel means an equivalent
    /// trigger is already queued, so the `Full` case is a silent no-op.
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}
