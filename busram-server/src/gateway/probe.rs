//! Probe disambiguation for token-less POSTs
//!
//! A POST is protocol traffic only if it names a session. Everything else is
//! a liveness probe and never reaches the registry, unless the gateway runs
//! in default-session compatibility mode.

use busram_protocol::SessionId;

use crate::config::{GatewayConfig, TokenlessPost};

/// Query parameter carrying the session token
pub const SESSION_PARAM: &str = "session_id";

/// Classification of an inbound POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Probe,
    RealMessage(SessionId),
}

/// Decide how to treat a POST from its query string alone
pub fn classify(query: Option<&str>, policy: &GatewayConfig) -> Classification {
    match session_token(query) {
        Some(id) => Classification::RealMessage(id),
        None => match policy.tokenless_post {
            TokenlessPost::Probe => Classification::Probe,
            TokenlessPost::DefaultSession => {
                Classification::RealMessage(SessionId::new(policy.default_session_id.clone()))
            }
        },
    }
}

/// Session token from a query string; blank counts as absent
pub fn session_token(query: Option<&str>) -> Option<SessionId> {
    query_param(query, SESSION_PARAM)
        .filter(|v| !v.trim().is_empty())
        .map(SessionId::new)
}

/// First value of `key` in a form-encoded query string
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(k, _)| decode(k) == key)
        .map(|(_, v)| decode(v))
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
