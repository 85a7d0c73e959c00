//! Client-side connector issuing control operations
//!
//! One connector maps to one TCP connection; every operation sends a
//! request line and synchronously awaits the response line. Transport
//! failures surface as `Error::Connection` so the CLI can distinguish
//! "could not reach the launcher" from "the launcher said no".

use crate::control::proto::{Request, Response};
use crate::errors::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// An authenticated-by-convention connection to a launcher's control
/// endpoint. Credentials travel with every request; the connector just
/// remembers them.
pub struct Connector {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    username: String,
    password: String,
}

impl Connector {
    /// Connects to `addr` (`ip:port`).
    ///
    /// # Errors
    /// `Connection` when the endpoint is unreachable.
    pub async fn connect(addr: &str, username: String, password: String) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            Error::Connection(format!("could not reach the launcher at {addr}: {e}"))
        })?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            username,
            password,
        })
    }

    /// Asks the launcher whether the stored credentials are valid.
    ///
    /// # Errors
    /// `Connection` on transport failure, `Protocol` on an unparseable
    /// response.
    pub async fn check_credentials(&mut self) -> Result<bool> {
        let response = self
            .call(&Request::CheckCredentials {
                username: self.username.clone(),
                password: self.password.clone(),
            })
            .await?;
        Ok(response
            .data
            .as_ref()
            .and_then(|data| data.get("valid"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    /// Requests a process start; the response says whether it happened.
    ///
    /// # Errors
    /// `Connection` on transport failure, `Protocol` on an unparseable
    /// response.
    pub async fn start_process(&mut self) -> Result<Response> {
        self.call(&Request::StartProcess {
            username: self.username.clone(),
            password: self.password.clone(),
        })
        .await
    }

    /// Requests supervisor status and diagnostics.
    ///
    /// # Errors
    /// `Connection` on transport failure, `Protocol` on an unparseable
    /// response.
    pub async fn status(&mut self) -> Result<Response> {
        self.call(&Request::Status {
            username: self.username.clone(),
            password: self.password.clone(),
        })
        .await
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Connection(format!("failed to send the request: {e}")))?;

        let mut response = String::new();
        let read = self
            .reader
            .read_line(&mut response)
            .await
            .map_err(|e| Error::Connection(format!("failed to read the response: {e}")))?;
        if read == 0 {
            return Err(Error::Connection(
                "the launcher closed the connection".to_owned(),
            ));
        }
        Ok(serde_json::from_str(&response)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::init_test_tracing;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_connection_error() {
        init_test_tracing();
        // Bind and drop a listener so the port is known to be closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Connector::connect(&addr, "admin".to_owned(), "pw".to_owned()).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
