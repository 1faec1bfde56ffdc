use std::{fmt, io, pin::Pin};

use tokio::io::{AsyncBufRead, AsyncReadExt};

use crate::core::logs::stream::RawLogStream;

/// Represents the result of an executed command in a container.
pub(crate) struct ExecResult {
    pub(crate) id: String,
    pub(crate) stdout: RawLogStream,
    pub(crate) stderr: RawLogStream,
}

impl ExecResult {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Returns an asynchronous reader for stdout.
    pub(crate) fn stdout_reader(&mut self) -> Pin<Box<dyn AsyncBufRead + '_>> {
        Box::pin(tokio_util::io::StreamReader::new(&mut self.stdout))
    }

    /// Returns an asynchronous reader for stderr.
    pub(crate) fn stderr_reader(&mut self) -> Pin<Box<dyn AsyncBufRead + '_>> {
        Box::pin(tokio_util::io::StreamReader::new(&mut self.stderr))
    }

    /// Drains stdout into a buffer.
    pub(crate) async fn stdout_to_vec(&mut self) -> Result<Vec<u8>, io::Error> {
        let mut out = Vec::new();
        self.stdout_reader().read_to_end(&mut out).await?;
        Ok(out)
    }

    /// Drains stderr into a buffer.
    pub(crate) async fn stderr_to_vec(&mut self) -> Result<Vec<u8>, io::Error> {
        let mut out = Vec::new();
        self.stderr_reader().read_to_end(&mut out).await?;
        Ok(out)
    }
}

impl fmt::Debug for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecResult").field("id", &self.id).finish()
    }
}
