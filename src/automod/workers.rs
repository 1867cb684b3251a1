//! src/automod/workers.rs
//! Właściciel zadań w tle: start, sygnał zamknięcia, czekanie na zakończenie.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct BackgroundWorkers {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for BackgroundWorkers {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundWorkers {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Odbiornik sygnału zamknięcia dla nowego zadania.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(worker = name, "starting background worker");
        self.handles.push((name, tokio::spawn(fut)));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(n, _)| *n).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wysyła sygnał i czeka na wszystkie zadania.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            match handle.await {
                Ok(()) => info!(worker = name, "background worker stopped"),
                Err(e) => warn!(error=?e, worker = name, "background worker ended abnormally"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_waits_for_workers() {
        let mut workers = BackgroundWorkers::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let mut rx = workers.subscribe();
        let flag = stopped.clone();
        workers.spawn("idle", async move {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(workers.names(), vec!["idle"]);
        workers.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
    }
}
