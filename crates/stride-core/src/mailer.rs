use tokio::sync::mpsc;

/// A rendered email waiting for an outbound worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailJob {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
}

/// Cloneable handle onto the outbound email queue. Enqueueing is
/// best-effort: losing a fallback email must never fail the write that
/// triggered it.
#[derive(Clone)]
pub struct EmailQueue {
    sender: mpsc::UnboundedSender<EmailJob>,
}

impl EmailQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmailJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: EmailJob) {
        if self.sender.send(job).is_err() {
            tracing::warn!("email queue closed, dropping outbound email");
        }
    }
}
