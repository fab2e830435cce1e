//! Permission provider driven by configuration
//!
//! A desktop terminal has no permission dialog. The `[permissions]` section
//! says what is held at startup and whether a request is granted.

use std::sync::Mutex;

use async_trait::async_trait;
use rfchat_core::{Permission, PermissionProvider, PermissionState};
use tracing::info;

use crate::config::PermissionConfig;

pub struct ConfigPermissions {
    state: Mutex<PermissionState>,
    grant_on_request: bool,
}

impl ConfigPermissions {
    pub fn new(config: &PermissionConfig) -> Self {
        Self {
            state: Mutex::new(PermissionState::from_granted(&config.granted)),
            grant_on_request: config.grant_on_request,
        }
    }

    fn snapshot(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PermissionProvider for ConfigPermissions {
    fn check(&self, permission: Permission) -> bool {
        self.snapshot().grants(permission)
    }

    async fn request_batch(&self, permissions: &[Permission]) -> PermissionState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.grant_on_request {
            for &permission in permissions {
                state.set(permission, true);
            }
            info!("Granted requested permissions: {:?}", permissions);
        } else {
            info!("Permission request refused by configuration: {:?}", permissions);
        }
        *state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_on_request() {
        let permissions = ConfigPermissions::new(&PermissionConfig::default());
        assert!(!permissions.check(Permission::Scan));

        let answer = permissions.request_batch(&Permission::ALL).await;
        assert!(answer.grants_all(&Permission::ALL));
        assert!(permissions.check(Permission::Location));
    }

    #[tokio::test]
    async fn test_refusing_configuration_keeps_startup_grants() {
        let permissions = ConfigPermissions::new(&PermissionConfig {
            granted: vec![Permission::Connect],
            grant_on_request: false,
        });

        let answer = permissions.request_batch(&Permission::ALL).await;
        assert!(answer.connect);
        assert!(!answer.scan);
        assert!(!permissions.check(Permission::Scan));
    }
}
