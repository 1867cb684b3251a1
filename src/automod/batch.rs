//! src/automod/batch.rs
//! Kolejka wiadomości do oceny, zbierana co `batch_delay` w paczki.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::evaluator::BufferEvaluator;
use super::platform::InboundMessage;

pub struct BatchScheduler {
    tx: mpsc::UnboundedSender<InboundMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    /// Globalny zamek: dwie paczki nigdy nie idą równolegle.
    processing: Mutex<()>,
    delay: Duration,
    max_batch: usize,
}

impl BatchScheduler {
    pub fn new(delay: Duration, max_batch: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            processing: Mutex::new(()),
            delay,
            max_batch: max_batch.max(1),
        }
    }

    pub fn enqueue(&self, msg: InboundMessage) {
        if self.tx.send(msg).is_err() {
            warn!("batch queue closed; message dropped");
        }
    }

    /// Zdejmuje do `max_batch` wiadomości bez czekania i ocenia je po kolei.
    /// Każdy użytkownik oceniany jest co najwyżej raz (kontekstem jest jego
    /// najnowsza wiadomość w paczce). Zwraca liczbę ocenionych użytkowników.
    pub async fn tick(&self, evaluator: &BufferEvaluator) -> usize {
        let drained = {
            let mut rx = self.rx.lock().await;
            let mut out = Vec::with_capacity(self.max_batch);
            while out.len() < self.max_batch {
                match rx.try_recv() {
                    Ok(m) => out.push(m),
                    Err(_) => break,
                }
            }
            out
        };
        if drained.is_empty() {
            return 0;
        }

        let batch = latest_per_user(drained);
        let _global = self.processing.lock().await;
        debug!(users = batch.len(), "processing automod batch");
        for msg in &batch {
            evaluator.evaluate(msg).await;
        }
        batch.len()
    }

    /// Pętla: sen → paczka → sen ... aż do sygnału zamknięcia.
    pub async fn run(self: Arc<Self>, evaluator: Arc<BufferEvaluator>, mut shutdown: watch::Receiver<bool>) {
        info!(delay_ms = self.delay.as_millis() as u64, max_batch = self.max_batch, "batch scheduler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {
                    self.tick(&evaluator).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("batch scheduler stopped");
    }
}

/// Jedna wiadomość na użytkownika (najnowsza), w kolejności pierwszego wystąpienia.
fn latest_per_user(msgs: Vec<InboundMessage>) -> Vec<InboundMessage> {
    let mut out: Vec<InboundMessage> = Vec::with_capacity(msgs.len());
    for m in msgs {
        match out.iter_mut().find(|o| o.author_id == m.author_id) {
            Some(slot) => *slot = m,
            None => out.push(m),
        }
    }
    out
}
