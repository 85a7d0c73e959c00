//! Launcher-side control endpoint
//!
//! A stateless-per-call service: every request line carries credentials,
//! is answered with exactly one response line, and connections are served
//! concurrently with the update scheduler. Failing to bind the configured
//! port is fatal to the launcher, because a descriptor pointing at a dead
//! port would be worse than no descriptor at all.

use crate::control::proto::{ErrorKind, Request, Response};
use crate::diagnostics::{self, DiagnosticsProbe};
use crate::errors::{Error, Result};
use crate::release::ReleaseSource;
use crate::supervisor::{ProcessState, ProcessSupervisor};
use crate::updater::ArtifactUpdater;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Serves control operations for one launcher instance.
pub struct ControlEndpoint<S> {
    updater: Arc<ArtifactUpdater<S>>,
    supervisor: Arc<ProcessSupervisor>,
    probe: Box<dyn DiagnosticsProbe>,
    admin_password: String,
    service: String,
}

impl<S: ReleaseSource + Send + Sync + 'static> ControlEndpoint<S> {
    /// Creates the endpoint guarding operations with `admin_password`.
    #[must_use]
    pub fn new(
        updater: Arc<ArtifactUpdater<S>>,
        supervisor: Arc<ProcessSupervisor>,
        probe: Box<dyn DiagnosticsProbe>,
        admin_password: String,
    ) -> Self {
        Self {
            updater,
            supervisor,
            probe,
            admin_password,
            service: crate::service_name(),
        }
    }

    /// Binds the listening socket.
    ///
    /// # Errors
    /// `Connection` when the port cannot be bound; the launcher treats
    /// this as fatal.
    pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
        TcpListener::bind((host, port)).await.map_err(|e| {
            Error::Connection(format!("failed to bind control port {host}:{port}: {e}"))
        })
    }

    /// Accepts and serves control connections until the launcher exits.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("control endpoint `{}` listening on {addr}", self.service),
            Err(e) => warn!("control endpoint listening, local address unknown: {e}"),
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("control connection from {peer}");
                    let endpoint = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = endpoint.handle_connection(stream).await {
                            warn!("control connection from {peer} failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("failed to accept control connection: {e}"),
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let (read_half, mut write_half) = stream.split();
        let mut lines = BufReader::new(read_half).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => Response::failure(
                    &self.service,
                    ErrorKind::Internal,
                    format!("malformed request: {e}"),
                ),
            };
            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            write_half.write_all(payload.as_bytes()).await?;
        }
        Ok(())
    }

    /// The username is accepted as-is; only the password is the secret.
    fn credentials_valid(&self, _username: &str, password: &str) -> bool {
        password == self.admin_password
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::CheckCredentials { username, password } => {
                let valid = self.credentials_valid(&username, &password);
                let message = if valid {
                    "credentials accepted"
                } else {
                    "credentials rejected"
                };
                Response::ok(&self.service, message, Some(json!({ "valid": valid })))
            }
            Request::StartProcess { username, password } => {
                if !self.credentials_valid(&username, &password) {
                    return Response::failure(
                        &self.service,
                        ErrorKind::AuthenticationFailure,
                        Error::AuthenticationFailure.to_string(),
                    );
                }
                match self.updater.start_process().await {
                    Ok(()) => Response::ok(&self.service, "process started", None),
                    Err(e) => Response::failure(&self.service, ErrorKind::from(&e), e.to_string()),
                }
            }
            Request::Status { username, password } => {
                if !self.credentials_valid(&username, &password) {
                    return Response::failure(
                        &self.service,
                        ErrorKind::AuthenticationFailure,
                        Error::AuthenticationFailure.to_string(),
                    );
                }
                let status = self.supervisor.status().await;
                let pid = (status.state == ProcessState::Running)
                    .then_some(status.pid)
                    .flatten();
                let snapshot = diagnostics::snapshot(self.probe.as_ref(), pid);
                let data = json!({ "process": status, "diagnostics": snapshot });
                Response::ok(&self.service, "status", Some(data))
            }
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::control::client::Connector;
    use crate::diagnostics::NoopProbe;
    use crate::test_utils::{SLEEPER_SCRIPT, StubSource, init_test_tracing, scratch_dir, write_script};
    use regex::Regex;
    use std::path::Path;
    use std::time::Duration;

    const PASSWORD: &str = "correct-horse-battery";

    struct Harness {
        supervisor: Arc<ProcessSupervisor>,
        addr: String,
    }

    /// Brings up a full endpoint on an ephemeral port with an installed
    /// artifact, the way the launcher wires it at startup.
    async fn harness_with_password(dir: &Path, password: &str) -> Harness {
        let artifact = dir.join("app");
        write_script(&artifact, SLEEPER_SCRIPT);
        let supervisor = Arc::new(ProcessSupervisor::new(artifact.clone(), Vec::new()));
        let updater = Arc::new(ArtifactUpdater::new(
            StubSource::new(b""),
            Arc::clone(&supervisor),
            artifact,
            Regex::new(r"app-.*").unwrap(),
        ));
        let endpoint = Arc::new(ControlEndpoint::new(
            updater,
            Arc::clone(&supervisor),
            Box::new(NoopProbe),
            password.to_owned(),
        ));
        let listener = ControlEndpoint::<StubSource>::bind("127.0.0.1", 0)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(endpoint.serve(listener));
        Harness { supervisor, addr }
    }

    async fn harness(dir: &Path) -> Harness {
        harness_with_password(dir, PASSWORD).await
    }

    async fn connect(harness: &Harness, password: &str) -> Connector {
        Connector::connect(&harness.addr, "admin".to_owned(), password.to_owned())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_check_credentials() {
        init_test_tracing();
        let dir = scratch_dir("server-check-credentials");
        let harness = harness(&dir).await;

        let mut good = connect(&harness, PASSWORD).await;
        assert!(good.check_credentials().await.unwrap());

        let mut bad = connect(&harness, "wrong").await;
        assert!(
            !bad.check_credentials().await.unwrap(),
            "a wrong password must always be rejected"
        );
    }

    #[tokio::test]
    async fn test_start_process_requires_credentials() {
        init_test_tracing();
        let dir = scratch_dir("server-auth-start");
        let harness = harness(&dir).await;

        let mut bad = connect(&harness, "wrong").await;
        let response = bad.start_process().await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorKind::AuthenticationFailure));
        assert!(
            !harness.supervisor.ever_started().await,
            "a failed login must not start anything"
        );
    }

    #[tokio::test]
    async fn test_start_process_and_conflict() {
        init_test_tracing();
        let dir = scratch_dir("server-start");
        let harness = harness(&dir).await;

        let mut connector = connect(&harness, PASSWORD).await;
        let response = connector.start_process().await.unwrap();
        assert!(response.success, "{}", response.message);
        assert_eq!(
            harness.supervisor.status().await.state,
            ProcessState::Running
        );

        let again = connector.start_process().await.unwrap();
        assert!(!again.success);
        assert_eq!(again.error, Some(ErrorKind::AlreadyRunning));

        harness
            .supervisor
            .stop(Duration::from_millis(200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_descriptor_password_opens_the_endpoint() {
        init_test_tracing();
        let dir = scratch_dir("server-descriptor-auth");

        // Launcher side: publish a descriptor and guard the endpoint with
        // the password it generated.
        let descriptor = crate::control::descriptor::ConnectionDescriptor::generate(
            0,
            "app".to_owned(),
        );
        descriptor.write(&dir).await.unwrap();
        let harness = harness_with_password(&dir, &descriptor.admin_password).await;

        // Client side: rediscover the credential through the file.
        let rediscovered = crate::control::descriptor::ConnectionDescriptor::read(&dir)
            .await
            .unwrap();
        let mut connector = connect(&harness, &rediscovered.admin_password).await;
        assert!(
            connector.check_credentials().await.unwrap(),
            "the password published for this run must open the endpoint"
        );
    }

    #[tokio::test]
    async fn test_status_reports_state_and_service_name() {
        init_test_tracing();
        let dir = scratch_dir("server-status");
        let harness = harness(&dir).await;

        let mut connector = connect(&harness, PASSWORD).await;
        let response = connector.status().await.unwrap();
        assert!(response.success);
        assert_eq!(response.service, crate::service_name());
        let data = response.data.unwrap();
        assert_eq!(data["process"]["state"], "stopped");

        connector.start_process().await.unwrap();
        let running = connector.status().await.unwrap();
        let data = running.data.unwrap();
        assert_eq!(data["process"]["state"], "running");
        assert!(data["process"]["pid"].is_number());

        harness
            .supervisor
            .stop(Duration::from_millis(200))
            .await
            .unwrap();
    }
}
