use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, ScanId};

/// Printer label used when a job is routed by client id alone.
pub const DEFAULT_PRINTER_LABEL: &str = "default";

/// A unit of print work. Built once, dispatched once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrintJob {
    payload: String,
    destination: Option<ClientId>,
    printer_id: String,
    origin: Option<ScanId>,
}

impl PrintJob {
    pub fn new(payload: impl Into<String>, printer_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            destination: None,
            printer_id: printer_id.into(),
            origin: None,
        }
    }

    /// Route to this client instead of the registry default.
    pub fn with_destination(mut self, destination: Option<ClientId>) -> Self {
        self.destination = destination;
        self
    }

    /// Record the scan that produced this job.
    pub fn with_origin(mut self, origin: ScanId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn destination(&self) -> Option<&ClientId> {
        self.destination.as_ref()
    }

    pub fn printer_id(&self) -> &str {
        &self.printer_id
    }

    pub fn origin(&self) -> Option<&ScanId> {
        self.origin.as_ref()
    }
}

/// Wire form of a job as pushed to a printing agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "print")]
pub struct RenderedPrintMessage {
    pub qr_data: String,
    /// Base64-encoded PNG.
    pub qr_image: String,
    pub printer_id: String,
}

impl RenderedPrintMessage {
    pub fn from_job(job: &PrintJob, qr_image: String) -> Self {
        Self {
            qr_data: job.payload.clone(),
            qr_image,
            printer_id: job.printer_id.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Confirmation that a rendered job was handed to the transport.
/// Not proof of printing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    pub client_id: ClientId,
    pub bytes: usize,
}
