use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use super::state::SessionState;
use crate::configuration::types::AccountConfig;
use crate::voice::DialTarget;

/// The one live voice session, rebuilt from scratch on every server hop.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub account_index: usize,
    pub account_name: String,
    pub target: DialTarget,
    pub ident: String,
    /// Channel joined after connecting; empty means the server's default.
    pub channel_name: String,
    pub comment: Option<String>,
    pub current_channel_id: Option<u32>,
    pub state: SessionState,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Serializable view used by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub account: String,
    pub server: String,
    pub username: String,
    pub state: SessionState,
    pub channel_id: Option<u32>,
    pub connected_at: Option<DateTime<Utc>>,
}

pub fn random_username() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("voxgate-{}", &hex[..12])
}

impl Session {
    pub fn from_account(index: usize, account: &AccountConfig) -> Self {
        let username = if account.username.trim().is_empty() {
            let generated = random_username();
            info!(
                "Account '{}' has no username, using {}",
                account.name, generated
            );
            generated
        } else {
            account.username.clone()
        };

        Session {
            account_index: index,
            account_name: account.name.clone(),
            target: DialTarget {
                address: account.server.clone(),
                username,
                password: account.password.clone(),
                insecure: account.insecure,
                certificate: account.certificate.clone(),
            },
            ident: account.ident.clone(),
            channel_name: account.channel.clone(),
            comment: account.comment.clone(),
            current_channel_id: None,
            state: SessionState::Disconnected,
            connected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_online()
    }

    pub fn is_transmitting(&self) -> bool {
        self.state == SessionState::Transmitting
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            account: self.account_name.clone(),
            server: self.target.address.clone(),
            username: self.target.username.clone(),
            state: self.state,
            channel_id: self.current_channel_id,
            connected_at: self.connected_at,
        }
    }
}
