pub mod errors;
pub mod ids;
pub mod job;
pub mod protocol;
pub mod sink;

pub use errors::{DispatchError, ProtocolError, RegistryError, SinkError};
pub use ids::{ClientId, ScanId};
pub use job::{DispatchReceipt, PrintJob, RenderedPrintMessage};
pub use sink::PrintSink;
