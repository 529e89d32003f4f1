//! Background print queue for scan-triggered jobs.
//!
//! Submission never blocks the caller: a full queue drops the job with a
//! warning. One worker drains the queue in order and logs every outcome.

use std::sync::Arc;

use qrdesk_core::PrintJob;
use qrdesk_store::ScanRepo;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatcher::PrintDispatcher;

#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<PrintJob>,
}

impl DispatchQueue {
    /// Create a queue and the worker that will drain it.
    pub fn new(capacity: usize) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, DispatchWorker { rx })
    }

    /// Enqueue a job. Returns `false` if it was dropped.
    pub fn submit(&self, job: PrintJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    printer_id = job.printer_id(),
                    scan_id = ?job.origin(),
                    "dispatch queue full, dropping print job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("dispatch worker stopped, dropping print job");
                false
            }
        }
    }
}

pub struct DispatchWorker {
    rx: mpsc::Receiver<PrintJob>,
}

impl DispatchWorker {
    pub fn spawn(self, dispatcher: Arc<PrintDispatcher>, scans: Option<ScanRepo>) -> JoinHandle<()> {
        tokio::spawn(self.run(dispatcher, scans))
    }

    /// Process jobs until every [`DispatchQueue`] handle is dropped. When a job
    /// came from a stored scan and was delivered, the scan is marked printed.
    pub async fn run(mut self, dispatcher: Arc<PrintDispatcher>, scans: Option<ScanRepo>) {
        while let Some(job) = self.rx.recv().await {
            match dispatcher.dispatch(&job).await {
                Ok(_) => {
                    if let (Some(repo), Some(scan_id)) = (&scans, job.origin()) {
                        if let Err(e) = repo.mark_printed(scan_id) {
                            tracing::warn!(scan_id = %scan_id, error = %e, "could not mark scan printed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        kind = e.error_kind(),
                        scan_id = ?job.origin(),
                        "background print failed"
                    );
                }
            }
        }
        tracing::debug!("dispatch queue closed");
    }
}
