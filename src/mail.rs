//! Outbound email queue.
//!
//! Handlers hand mail to an [`Outbox`]; a single worker ([`run_mailer`])
//! drains it through a [`MailTransport`], retrying failed deliveries and
//! counting the outcome in the [`MailStats`] shared with the outbox.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait MailTransport: Send + Sync + 'static {
    fn deliver(&self, mail: &OutboundMail) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Writes mail to the log instead of sending it.
pub struct LogTransport;

impl MailTransport for LogTransport {
    async fn deliver(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "outgoing mail");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MailStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl MailStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMail>,
    stats: Arc<MailStats>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMail>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, stats: Arc::default() }, rx)
    }

    /// Counters for the worker draining this outbox.
    pub fn stats(&self) -> Arc<MailStats> {
        self.stats.clone()
    }

    pub async fn enqueue(&self, mail: OutboundMail) -> anyhow::Result<()> {
        self.tx
            .send(mail)
            .await
            .map_err(|_| anyhow::anyhow!("mail worker is not running"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(2) }
    }
}

/// Runs until every [`Outbox`] handle is dropped.
pub async fn run_mailer<T: MailTransport>(
    mut rx: mpsc::Receiver<OutboundMail>,
    transport: T,
    policy: RetryPolicy,
    stats: Arc<MailStats>,
) {
    while let Some(mail) = rx.recv().await {
        deliver_with_retry(&transport, &mail, policy, &stats).await;
    }
    tracing::debug!("mail queue closed");
}

async fn deliver_with_retry<T: MailTransport>(transport: &T, mail: &OutboundMail, policy: RetryPolicy, stats: &MailStats) {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match transport.deliver(mail).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(to = %mail.to, attempt, error = %err, "mail delivery failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(err) => {
                tracing::error!(to = %mail.to, attempts, error = %err, "mail delivery gave up");
            }
        }
    }
    stats.failed.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Fails the first `failures` deliveries, then records the rest.
    struct Flaky {
        failures: AtomicU64,
        sent: Arc<Mutex<Vec<OutboundMail>>>,
    }

    impl MailTransport for Flaky {
        async fn deliver(&self, mail: &OutboundMail) -> anyhow::Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("smtp unavailable");
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn mail(to: &str) -> OutboundMail {
        OutboundMail { to: to.into(), subject: "hi".into(), body: "code 123456".into() }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Flaky { failures: AtomicU64::new(2), sent: sent.clone() };
        let stats = Arc::new(MailStats::default());
        let (outbox, rx) = Outbox::channel(4);

        outbox.enqueue(mail("a@example.com")).await.unwrap();
        drop(outbox);
        run_mailer(rx, transport, fast(3), stats.clone()).await;

        assert_eq!(stats.delivered(), 1);
        assert_eq!(stats.failed(), 0);
        assert_eq!(sent.lock().unwrap().as_slice(), &[mail("a@example.com")]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_counted() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Flaky { failures: AtomicU64::new(2), sent: sent.clone() };
        let stats = Arc::new(MailStats::default());
        let (outbox, rx) = Outbox::channel(4);

        outbox.enqueue(mail("a@example.com")).await.unwrap();
        outbox.enqueue(mail("b@example.com")).await.unwrap();
        drop(outbox);
        run_mailer(rx, transport, fast(2), stats.clone()).await;

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.delivered(), 1);
        assert_eq!(sent.lock().unwrap().as_slice(), &[mail("b@example.com")]);
    }

    #[tokio::test]
    async fn outbox_stats_follow_the_worker() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Flaky { failures: AtomicU64::new(0), sent };
        let (outbox, rx) = Outbox::channel(4);
        let stats = outbox.stats();

        outbox.enqueue(mail("a@example.com")).await.unwrap();
        let worker = tokio::spawn(run_mailer(rx, transport, fast(1), outbox.stats()));
        drop(outbox);
        worker.await.unwrap();

        assert_eq!(stats.delivered(), 1);
    }

    #[tokio::test]
    async fn enqueue_fails_without_a_worker() {
        let (outbox, rx) = Outbox::channel(1);
        drop(rx);
        assert!(outbox.enqueue(mail("a@example.com")).await.is_err());
    }
}
