//! Queue workers for outbound and inbound messages, and the collaborator
//! ports they call.

pub mod receiver;
pub mod sender;
pub mod transport;

pub use receiver::{ReceiveJob, ReceiveWorker};
pub use sender::{SendJob, SendWorker};
pub use transport::{Ledger, Transport};
