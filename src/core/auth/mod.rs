use serde::{Deserialize, Serialize};

const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";
const DEFAULT_USERNAME: &str = "Player";
const DEFAULT_USER_TYPE: &str = "mojang";

/// The signed-in player, as handed over by the authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
}

fn default_user_type() -> String {
    DEFAULT_USER_TYPE.into()
}

impl Default for PlayerIdentity {
    fn default() -> Self {
        Self::offline(DEFAULT_USERNAME)
    }
}

impl PlayerIdentity {
    pub fn new(
        username: impl Into<String>,
        uuid: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            uuid: uuid.into(),
            access_token: access_token.into(),
            user_type: default_user_type(),
        }
    }

    pub fn offline(username: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            uuid: NIL_UUID.into(),
            access_token: "offline_access_token".into(),
            user_type: "legacy".into(),
        }
    }

    /// Blank fields would leave the game with a dangling `--flag`.
    pub fn sanitized(mut self) -> Self {
        if self.username.trim().is_empty() {
            self.username = DEFAULT_USERNAME.into();
        }
        if self.uuid.trim().is_empty() {
            self.uuid = NIL_UUID.into();
        }
        if self.access_token.trim().is_empty() {
            self.access_token = "offline_access_token".into();
        }
        if self.user_type.trim().is_empty() {
            self.user_type = default_user_type();
        }
        self
    }
}
