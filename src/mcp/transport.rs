//! stdio transport for the registry's MCP surface.
//!
//! One UTF-8 JSON-RPC message per line: stdin carries client messages,
//! stdout carries replies. stderr is left to the logging layer, which is why
//! the tracing subscriber writes there.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Newline-delimited message transport over stdin/stdout.
pub struct StdioTransport {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl StdioTransport {
    /// Creates a transport over this process's stdio handles.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next message line, or `None` once stdin reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_message(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }

        Ok(Some(line))
    }

    /// Serialises a message and writes it to stdout as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // An embedded newline would split the message in two.
        debug_assert!(!json.contains('\n'), "message must serialise to one line");

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
