pub use self::copy::{CopyDataSource, CopyToContainer};

pub(crate) mod async_drop;
pub mod client;
pub(crate) mod copy;
pub(crate) mod env;
pub mod error;
pub(crate) mod logs;
pub(crate) mod mounts;
