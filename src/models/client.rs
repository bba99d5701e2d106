use serde::{Deserialize, Serialize};

/// Caller identity resolved from the bearer token by `bearer_auth_checker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthedClient {
    pub client_id: i64,
}

impl AuthedClient {
    pub fn new(client_id: i64) -> Self {
        Self { client_id }
    }
}

/// Directory entry of a client. Only the group matters for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub group_id: Option<i64>,
}

impl ClientProfile {
    pub fn in_groups(&self, allowed: &[i64]) -> bool {
        self.group_id.is_some_and(|g| allowed.contains(&g))
    }
}
