use bytes::Bytes;

pub(crate) mod stream;

/// A single chunk of output attributed to either stream of a running process.
#[derive(Debug, Clone)]
pub(crate) enum LogFrame {
    StdOut(Bytes),
    StdErr(Bytes),
}
