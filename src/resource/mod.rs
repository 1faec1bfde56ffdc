//! File/archive transfer, module source retrieval, and tool-stub generation between the host
//! and a container's resource service: [`client`] is the host-side typed wrapper (C3), [`server`]
//! is a reference implementation of the in-container HTTP service it talks to (C4), shipped here
//! rather than treated as a purely external collaborator so the client side has something real to
//! test against.

pub mod client;
pub mod error;
mod modules;
pub mod protocol;
pub mod server;

pub use client::ResourceClient;
pub use error::ResourceError;
