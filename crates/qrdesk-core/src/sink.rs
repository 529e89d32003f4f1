use async_trait::async_trait;

use crate::errors::SinkError;
use crate::job::RenderedPrintMessage;

/// Write capability of one printing-agent connection.
///
/// The registry and dispatcher only ever hold `Arc<dyn PrintSink>`; the
/// concrete transport (a WebSocket writer queue in production) stays behind
/// this trait. Returns the number of bytes handed to the transport.
#[async_trait]
pub trait PrintSink: Send + Sync {
    async fn send(&self, message: &RenderedPrintMessage) -> Result<usize, SinkError>;
}
