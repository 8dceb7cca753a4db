//! Ports for the external collaborators the workers drive.
//!
//! Neither the concrete transport nor the ledger mechanism lives in this
//! crate; the runtime is generic over both.

use courier_types::error::{LedgerError, TransportError};
use serde_json::Value;

/// Delivers an outbound object to a counterparty.
pub trait Transport: Send + Sync + 'static {
    /// Deliver `object` to `user_id`, returning the delivery record that is
    /// appended to the user's history.
    fn send(
        &self,
        user_id: &str,
        object: &Value,
    ) -> impl std::future::Future<Output = Result<Value, TransportError>> + Send;
}

/// Submits seal requests to an external ledger.
///
/// Broadcast and confirmation are reported back asynchronously through
/// `BotRuntime::on_wrote` and `BotRuntime::on_read`.
pub trait Ledger: Send + Sync + 'static {
    fn request_seal(
        &self,
        link: &str,
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;
}
