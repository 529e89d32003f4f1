use std::sync::Arc;

use qrdesk_core::{DispatchError, DispatchReceipt, PrintJob, RenderedPrintMessage};
use qrdesk_qr::QrRenderer;
use tracing::instrument;

use crate::registry::ConnectionRegistry;

/// Routes a print job to one live agent connection.
pub struct PrintDispatcher {
    registry: Arc<ConnectionRegistry>,
    renderer: Arc<dyn QrRenderer>,
}

impl PrintDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, renderer: Arc<dyn QrRenderer>) -> Self {
        Self { registry, renderer }
    }

    /// Resolve, render, and write the job once. Nothing is retried; a receipt
    /// means the message reached the connection's outbound queue.
    #[instrument(skip_all, fields(printer_id = job.printer_id(), destination = ?job.destination()))]
    pub async fn dispatch(&self, job: &PrintJob) -> Result<DispatchReceipt, DispatchError> {
        let (client_id, handle) = self.registry.resolve(job.destination())?;

        let qr_image = self
            .renderer
            .render_base64(job.payload())
            .map_err(|e| DispatchError::Render(e.to_string()))?;
        let message = RenderedPrintMessage::from_job(job, qr_image);

        match handle.send(&message).await {
            Ok(bytes) => {
                tracing::info!(client_id = %client_id, bytes, "print command sent");
                Ok(DispatchReceipt { client_id, bytes })
            }
            Err(cause) => {
                tracing::warn!(client_id = %client_id, error = %cause, "print command not delivered");
                Err(DispatchError::DeliveryFailed { client_id, cause })
            }
        }
    }
}
