//! Scriptable permission provider

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rfchat_core::{Permission, PermissionProvider, PermissionState};

#[derive(Debug, Default)]
struct PermissionsInner {
    state: PermissionState,
    answer: Option<PermissionState>,
    requests: Vec<Vec<Permission>>,
}

/// In-memory [`PermissionProvider`]
///
/// Without a scripted answer every request is granted in full. Granted
/// answers stick, so later checks see them.
#[derive(Debug, Default)]
pub struct MockPermissions {
    inner: Mutex<PermissionsInner>,
    delay: Option<Duration>,
}

impl MockPermissions {
    /// Every permission already held
    pub fn granted() -> Self {
        Self::with_state(PermissionState::all_granted())
    }

    /// Nothing held yet
    pub fn denied() -> Self {
        Self::with_state(PermissionState::default())
    }

    pub fn with_state(state: PermissionState) -> Self {
        Self {
            inner: Mutex::new(PermissionsInner {
                state,
                ..Default::default()
            }),
            delay: None,
        }
    }

    /// Hold every request for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer every later request with `answer`
    pub fn answer_with(&self, answer: PermissionState) {
        self.lock().answer = Some(answer);
    }

    /// Grant or revoke one permission directly
    pub fn set(&self, permission: Permission, granted: bool) {
        self.lock().state.set(permission, granted);
    }

    /// Every batch requested so far, in request order
    pub fn requests(&self) -> Vec<Vec<Permission>> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PermissionsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PermissionProvider for MockPermissions {
    fn check(&self, permission: Permission) -> bool {
        self.lock().state.grants(permission)
    }

    async fn request_batch(&self, permissions: &[Permission]) -> PermissionState {
        self.lock().requests.push(permissions.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        let answer = inner
            .answer
            .unwrap_or_else(|| PermissionState::from_granted(permissions));
        for &permission in permissions {
            if answer.grants(permission) {
                inner.state.set(permission, true);
            }
        }
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_answer_grants_and_sticks() {
        let permissions = MockPermissions::denied();
        assert!(!permissions.check(Permission::Connect));

        let answer = permissions.request_batch(&[Permission::Connect]).await;
        assert!(answer.connect);
        assert!(!answer.scan);
        assert!(permissions.check(Permission::Connect));
    }

    #[tokio::test]
    async fn test_scripted_partial_answer() {
        let permissions = MockPermissions::denied();
        permissions.answer_with(PermissionState {
            scan: true,
            connect: false,
            location: false,
        });

        let answer = permissions.request_batch(&Permission::ALL).await;
        assert!(!answer.grants_all(&Permission::ALL));
        assert!(permissions.check(Permission::Scan));
        assert!(!permissions.check(Permission::Connect));
        assert_eq!(permissions.requests(), vec![Permission::ALL.to_vec()]);
    }
}
