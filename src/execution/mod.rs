//! The execution client: a kernel gateway session bound to a single container, through which
//! Python code is submitted and its output streamed back.

pub(crate) mod channel;
mod error;
mod protocol;
mod session;

pub use error::ExecutionError;
pub use protocol::{ErrorRecord, MessagePayload};
pub use session::{ErrorRecordSnapshot, Execution, ExecutionResult, ExecutionState, Session};
