use std::net::{SocketAddr, TcpListener};

use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use warp::{Filter, Rejection, Reply};

use super::routes::{command_route, status_route};
use crate::commands::CommandRegistry;
use crate::controller::types::{ControlInput, StatusSnapshot};
use crate::error_handling::types::WebError;

/// HTTP front end of the control loop. It never touches the session itself,
/// it only queues commands and reads the published status.
pub struct WebServer {
    registry: CommandRegistry,
    inputs: mpsc::Sender<ControlInput>,
    status: watch::Receiver<StatusSnapshot>,
}

impl WebServer {
    pub fn new(
        registry: CommandRegistry,
        inputs: mpsc::Sender<ControlInput>,
        status: watch::Receiver<StatusSnapshot>,
    ) -> Self {
        Self {
            registry,
            inputs,
            status,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        command_route(self.registry.clone(), self.inputs.clone())
            .or(status_route(self.status.clone()))
    }

    /// Serves the routes on every interface in a background task.
    ///
    /// # Errors
    /// Returns [`WebError::BindFailed`] when the port is already taken.
    pub fn spawn(self, port: u16) -> Result<JoinHandle<()>, WebError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();

        // warp panics on a failed bind, check the port first
        let probe = TcpListener::bind(addr)
            .map_err(|e| WebError::BindFailed(format!("port {}: {}", port, e)))?;
        drop(probe);

        let routes = self.routes();
        info!("HTTP command endpoint listening on port {}", port);
        Ok(tokio::spawn(warp::serve(routes).run(addr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, Origin};
    use crate::configuration::ApiConfig;
    use crate::session_management::{SessionSummary, SessionState};
    use serial_test::serial;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            session: SessionSummary {
                account: "alpha".to_string(),
                server: "alpha:64738".to_string(),
                username: "gate".to_string(),
                state: SessionState::Connected,
                channel_id: Some(1),
                connected_at: None,
            },
            account_index: 0,
            account_count: 2,
            connect_attempts: 1,
            participants: None,
            active_job: None,
            running_jobs: 0,
            uptime_secs: 42,
        }
    }

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = None;
        for _ in 0..50 {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        let mut stream = stream.expect("server did not come up");
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    #[serial]
    async fn taken_port_is_reported() {
        let holder = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let (inputs, _rx) = mpsc::channel(1);
        let (_status_tx, status) = watch::channel(snapshot());

        let server = WebServer::new(CommandRegistry::new(ApiConfig::default()), inputs, status);

        assert!(matches!(server.spawn(port), Err(WebError::BindFailed(_))));
    }

    #[tokio::test]
    #[serial]
    async fn serves_commands_and_status() {
        let port = free_port();
        let (inputs, mut rx) = mpsc::channel(4);
        let (status_tx, status) = watch::channel(snapshot());
        let server = WebServer::new(CommandRegistry::new(ApiConfig::default()), inputs, status);
        let task = server.spawn(port).unwrap();

        let response = get(port, "/?command=F8").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("API Start Transmitting Request Processed Successfully"));
        assert_eq!(
            rx.recv().await,
            Some(ControlInput::Command {
                command: Command::StartTransmitting,
                origin: Origin::Http,
            })
        );

        let response = get(port, "/?command=commandKeyCtrlW").await;
        assert!(response.starts_with("HTTP/1.1 403"));

        let mut updated = snapshot();
        updated.session.state = SessionState::Transmitting;
        status_tx.send_replace(updated);
        let response = get(port, "/status").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"uptime_secs\":42"));
        assert!(response.contains("\"state\":\"Transmitting\""));

        task.abort();
    }
}
