use crate::ids::ClientId;

/// Why a write to a printing agent's channel did not reach the transport.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    QueueFull,
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Outcome classification for a single dispatch attempt.
/// None of these are retried; the job is consumed either way.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no client specified and no default printer set")]
    NoDestination,
    #[error("client {0} is not connected")]
    DestinationOffline(ClientId),
    #[error("delivery to {client_id} failed: {cause}")]
    DeliveryFailed { client_id: ClientId, cause: SinkError },
    #[error("could not render QR code: {0}")]
    Render(String),
}

impl DispatchError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NoDestination => "no_destination",
            Self::DestinationOffline(_) => "destination_offline",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::Render(_) => "render_failed",
        }
    }
}

/// Inbound frame on a printer connection that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("client id must not be empty")]
    EmptyClientId,
}
