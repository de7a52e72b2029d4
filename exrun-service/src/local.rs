// Local Processor Pool
// One worker task per processor pulling configurations from a bounded queue

use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::{bootstrap, RunContext, RunDispatch};

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

struct Job {
    ticket: u64,
    document: Document,
    working_dir: PathBuf,
}

#[derive(Default)]
struct Progress {
    next_ticket: u64,
    outstanding: usize,
    results: Vec<(u64, Document)>,
    errors: Vec<(u64, ServiceError)>,
}

#[derive(Default)]
struct Shared {
    progress: Mutex<Progress>,
    finished: Notify,
}

impl Shared {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, ticket: u64, outcome: ServiceResult<Document>) {
        let mut progress = self.progress();
        progress.outstanding -= 1;
        match outcome {
            Ok(document) => progress.results.push((ticket, document)),
            Err(e) => progress.errors.push((ticket, e)),
        }
        drop(progress);
        self.finished.notify_waiters();
    }
}

/// Runs configurations in parallel on this machine.
///
/// Each worker carries its processor id in the run context so shell units
/// pin their commands to it. The queue holds one job per worker; further
/// dispatches wait for room.
pub struct LocalPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalPool {
    pub fn start(processors: &[usize], context: &RunContext) -> ServiceResult<Self> {
        if processors.is_empty() {
            return Err(ServiceError::ConfigShape(
                "local pool needs at least one processor".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(processors.len());
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared::default());

        let workers = processors
            .iter()
            .map(|&processor| {
                let context = context.nested().with_processor(Some(processor));
                tokio::spawn(work(processor, receiver.clone(), context, shared.clone()))
            })
            .collect();

        info!(processors = ?processors, "started local pool");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Stop accepting work and wait for the workers to finish what is queued
    pub async fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "local worker panicked");
            }
        }
    }
}

async fn work(
    processor: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    context: RunContext,
    shared: Arc<Shared>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        debug!(processor, ticket = job.ticket, "running configuration");
        let context = context.clone().with_working_dir(job.working_dir);
        let outcome = bootstrap(job.document, &context).await;
        shared.finish(job.ticket, outcome);
    }
    debug!(processor, "local worker stopped");
}

#[async_trait::async_trait]
impl RunDispatch for LocalPool {
    async fn dispatch(&self, document: Document, working_dir: PathBuf) -> ServiceResult<()> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(sender) = sender else {
            return Err(ServiceError::unit_run("LocalPool", "pool is shut down"));
        };

        let ticket = {
            let mut progress = self.shared.progress();
            let ticket = progress.next_ticket;
            progress.next_ticket += 1;
            progress.outstanding += 1;
            ticket
        };

        let job = Job {
            ticket,
            document,
            working_dir,
        };
        if sender.send(job).await.is_err() {
            let err = || ServiceError::unit_run("LocalPool", "all workers stopped");
            self.shared.finish(ticket, Err(err()));
            return Err(err());
        }
        Ok(())
    }

    /// Wait for every dispatched run; fails with the earliest run's error if any failed
    async fn collect(&self) -> ServiceResult<Vec<Document>> {
        loop {
            let finished = self.shared.finished.notified();
            {
                let mut progress = self.shared.progress();
                if progress.outstanding == 0 {
                    let mut errors = std::mem::take(&mut progress.errors);
                    let mut results = std::mem::take(&mut progress.results);
                    errors.sort_by_key(|(ticket, _)| *ticket);
                    if let Some((_, e)) = errors.into_iter().next() {
                        return Err(e);
                    }
                    results.sort_by_key(|(ticket, _)| *ticket);
                    return Ok(results.into_iter().map(|(_, document)| document).collect());
                }
            }
            finished.await;
        }
    }
}
