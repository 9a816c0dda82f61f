//! Debounced persistence of the in-memory note list.
//!
//! Every edit calls [`Autosave::schedule`], which restarts the debounce timer.
//! When the timer fires without another edit arriving, the worker asks its
//! [`Persist`] target to write the complete note set. A failed save keeps the
//! worker dirty, so the next [`Autosave::flush`] retries it.

use std::sync::Arc;

use async_trait::async_trait;
use core_types::{NotesError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, warn};

#[async_trait]
pub trait Persist: Send + Sync + 'static {
    async fn persist(&self) -> Result<()>;
}

enum Signal {
    Schedule,
    Flush {
        force: bool,
        reply: oneshot::Sender<Result<()>>,
    },
}

pub struct Autosave {
    signals: mpsc::UnboundedSender<Signal>,
    worker: JoinHandle<()>,
}

impl Autosave {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(debounce: Duration, target: Arc<dyn Persist>) -> Self {
        let (signals, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(debounce, target, receiver));
        Self { signals, worker }
    }

    pub fn schedule(&self) {
        if self.signals.send(Signal::Schedule).is_err() {
            warn!("autosave worker has stopped; edit was not scheduled");
        }
    }

    /// Saves now if an edit is waiting on the timer or a previous save failed.
    pub async fn flush(&self) -> Result<()> {
        self.request(false).await
    }

    /// Saves now unconditionally and cancels any pending timer.
    pub async fn save_now(&self) -> Result<()> {
        self.request(true).await
    }

    pub async fn shutdown(self) -> Result<()> {
        let result = self.flush().await;
        let Self { signals, worker } = self;
        drop(signals);
        if let Err(err) = worker.await {
            warn!("autosave worker ended abnormally: {err}");
        }
        result
    }

    async fn request(&self, force: bool) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.signals
            .send(Signal::Flush { force, reply })
            .map_err(|_| NotesError::storage("autosave", "worker has stopped"))?;
        response
            .await
            .map_err(|_| NotesError::storage("autosave", "worker dropped the request"))?
    }
}

async fn run(
    debounce: Duration,
    target: Arc<dyn Persist>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) {
    let mut deadline: Option<Instant> = None;
    let mut dirty = false;

    loop {
        let timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            signal = signals.recv() => match signal {
                Some(Signal::Schedule) => {
                    dirty = true;
                    // An unrepresentable deadline leaves the edit for the next flush.
                    deadline = Instant::now().checked_add(debounce);
                }
                Some(Signal::Flush { force, reply }) => {
                    deadline = None;
                    let result = if force || dirty {
                        persist(target.as_ref(), &mut dirty).await
                    } else {
                        Ok(())
                    };
                    // The requester may have gone away; the save still happened.
                    let _ = reply.send(result);
                }
                None => {
                    if dirty {
                        if let Err(err) = persist(target.as_ref(), &mut dirty).await {
                            warn!("final autosave failed: {err}");
                        }
                    }
                    break;
                }
            },
            () = timer => {
                deadline = None;
                if let Err(err) = persist(target.as_ref(), &mut dirty).await {
                    warn!("autosave failed: {err}");
                }
            }
        }
    }
}

async fn persist(target: &dyn Persist, dirty: &mut bool) -> Result<()> {
    let result = target.persist().await;
    *dirty = result.is_err();
    if result.is_ok() {
        debug!("autosave complete");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter {
        saves: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Persist for Counter {
        async fn persist(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotesError::storage("saving notes", "disk full"));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn saves(counter: &Counter) -> usize {
        counter.saves.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_rapid_edits_into_one_save() {
        let counter = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Duration::from_millis(1000), counter.clone());

        autosave.schedule();
        tokio::time::sleep(Duration::from_millis(500)).await;
        autosave.schedule();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(saves(&counter), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(saves(&counter), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(saves(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_saves_pending_edit_immediately() {
        let counter = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Duration::from_millis(1000), counter.clone());

        autosave.flush().await.expect("nothing pending");
        assert_eq!(saves(&counter), 0);

        autosave.schedule();
        autosave.flush().await.expect("flush");
        assert_eq!(saves(&counter), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(saves(&counter), 1);

        autosave.save_now().await.expect("forced");
        assert_eq!(saves(&counter), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_retried_on_flush() {
        let counter = Arc::new(Counter::default());
        counter.failing.store(true, Ordering::SeqCst);
        let autosave = Autosave::spawn(Duration::from_millis(100), counter.clone());

        autosave.schedule();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(saves(&counter), 0);

        let err = autosave.flush().await.expect_err("still failing");
        assert!(matches!(err, NotesError::Storage(_)));

        counter.failing.store(false, Ordering::SeqCst);
        autosave.flush().await.expect("retry");
        assert_eq!(saves(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_debounce_waits_for_flush() {
        let counter = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Duration::MAX, counter.clone());

        autosave.schedule();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(saves(&counter), 0);

        autosave.flush().await.expect("flush");
        assert_eq!(saves(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_writes_pending_edit() {
        let counter = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Duration::from_secs(60), counter.clone());

        autosave.schedule();
        autosave.shutdown().await.expect("shutdown");
        assert_eq!(saves(&counter), 1);
    }
}
