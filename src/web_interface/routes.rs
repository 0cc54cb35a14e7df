use log::{info, warn};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use crate::commands::{Command, CommandRegistry, Origin, Resolution};
use crate::controller::types::{ControlInput, StatusSnapshot};
use crate::error_handling::types::WebError;

/// Outcome of a command request, before it is turned into an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub status: StatusCode,
    pub message: String,
    pub command: Option<Command>,
}

/// Resolves the `command` query parameter against the registry.
pub fn command_reply(registry: &CommandRegistry, query: &HashMap<String, String>) -> CommandReply {
    let Some(token) = query.get("command") else {
        return CommandReply {
            status: StatusCode::BAD_REQUEST,
            message: "API Missing command Parameter".to_string(),
            command: None,
        };
    };

    let resolution = registry.resolve_http(token);
    let (status, command) = match &resolution {
        Resolution::Accepted { command, .. } => (StatusCode::OK, Some(*command)),
        Resolution::Denied { .. } => (StatusCode::FORBIDDEN, None),
        Resolution::Unknown => (StatusCode::NOT_FOUND, None),
    };

    CommandReply {
        status,
        message: resolution.message(),
        command,
    }
}

/// Resolves the request and queues the accepted command on the control loop.
pub async fn dispatch(
    registry: &CommandRegistry,
    inputs: &mpsc::Sender<ControlInput>,
    query: &HashMap<String, String>,
) -> CommandReply {
    let mut reply = command_reply(registry, query);
    if let Some(command) = reply.command {
        let input = ControlInput::Command {
            command,
            origin: Origin::Http,
        };
        if inputs.send(input).await.is_err() {
            warn!("Dropping http command {:?}, the control loop has stopped", command);
            reply.status = StatusCode::SERVICE_UNAVAILABLE;
            reply.message = WebError::ControlChannelClosed.to_string();
            reply.command = None;
        }
    }
    reply
}

/// GET /?command=<token>, answered in plain text.
pub fn command_route(
    registry: CommandRegistry,
    inputs: mpsc::Sender<ControlInput>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |query: HashMap<String, String>| {
            let registry = registry.clone();
            let inputs = inputs.clone();
            async move {
                let outcome = dispatch(&registry, &inputs, &query).await;
                info!("{} ({})", outcome.message, outcome.status.as_u16());
                Ok::<_, Rejection>(reply::with_status(outcome.message, outcome.status))
            }
        })
}

/// GET /status
pub fn status_route(
    status: watch::Receiver<StatusSnapshot>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let snapshot = status.borrow().clone();
            async move { Ok::<_, Rejection>(reply::json(&snapshot)) }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::ApiConfig;

    fn query(token: &str) -> HashMap<String, String> {
        HashMap::from([("command".to_string(), token.to_string())])
    }

    fn registry() -> CommandRegistry {
        let api = ApiConfig {
            channel_up: true,
            next_server: false,
            ..ApiConfig::default()
        };
        CommandRegistry::new(api)
    }

    #[test]
    fn replies_follow_the_resolution() {
        let registry = registry();

        let accepted = command_reply(&registry, &query("F1"));
        assert_eq!(accepted.status, StatusCode::OK);
        assert_eq!(accepted.command, Some(Command::ChannelUp));
        assert_eq!(accepted.message, "API Channel Up Request Processed Successfully");

        let denied = command_reply(&registry, &query("commandKeyCtrlN"));
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.command, None);

        let unknown = command_reply(&registry, &query("F13"));
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.message, "API Command Not Defined");

        let missing = command_reply(&registry, &HashMap::new());
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepted_commands_reach_the_control_loop() {
        let registry = registry();
        let (inputs, mut rx) = mpsc::channel(4);

        let reply = dispatch(&registry, &inputs, &query("F1")).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            rx.recv().await,
            Some(ControlInput::Command {
                command: Command::ChannelUp,
                origin: Origin::Http,
            })
        );

        dispatch(&registry, &inputs, &query("commandKeyCtrlN")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_loop_answers_unavailable() {
        let (inputs, rx) = mpsc::channel(1);
        drop(rx);

        let reply = dispatch(&registry(), &inputs, &query("F1")).await;

        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reply.message, "Control loop is no longer running");
        assert_eq!(reply.command, None);
    }
}
