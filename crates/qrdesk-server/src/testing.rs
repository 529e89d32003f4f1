//! Fakes shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use qrdesk_core::{PrintSink, RenderedPrintMessage, SinkError};
use qrdesk_qr::{QrError, QrRenderer};

/// Records every message it is asked to send; optionally fails instead.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<RenderedPrintMessage>>,
    attempts: Mutex<usize>,
    fail_with: Option<SinkError>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: SinkError) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(error),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<RenderedPrintMessage> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl PrintSink for RecordingSink {
    async fn send(&self, message: &RenderedPrintMessage) -> Result<usize, SinkError> {
        *self.attempts.lock() += 1;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.sent.lock().push(message.clone());
        Ok(message.qr_image.len())
    }
}

/// Renders the payload itself as the "image".
pub struct EchoRenderer;

impl QrRenderer for EchoRenderer {
    fn render_png(&self, data: &str) -> Result<Vec<u8>, QrError> {
        Ok(data.as_bytes().to_vec())
    }

    fn render_base64(&self, data: &str) -> Result<String, QrError> {
        Ok(format!("png:{data}"))
    }
}

pub struct RefusingRenderer;

impl QrRenderer for RefusingRenderer {
    fn render_png(&self, _data: &str) -> Result<Vec<u8>, QrError> {
        Err(QrError::Encode("data too long".into()))
    }
}
