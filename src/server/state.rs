use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;

use super::ServerConfig;
use crate::user::UserManager;
use crate::vlog::VlogManager;

pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedVlogManager = Arc<VlogManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_manager: GuardedUserManager,
    pub vlog_manager: GuardedVlogManager,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedVlogManager {
    fn from_ref(input: &ServerState) -> Self {
        input.vlog_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
