//! Permission gate in front of every radio operation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rfchat_core::{Permission, PermissionProvider, PermissionState};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Ensures the required permissions are held before a radio operation
///
/// At most one grant request is in flight; concurrent callers queue behind it
/// and re-check once it settles.
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    in_flight: Mutex<()>,
    requests: AtomicU64,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            in_flight: Mutex::new(()),
            requests: AtomicU64::new(0),
        }
    }

    /// Fresh snapshot of every permission
    pub fn snapshot(&self) -> PermissionState {
        let mut state = PermissionState::default();
        for permission in Permission::ALL {
            state.set(permission, self.provider.check(permission));
        }
        state
    }

    /// Resolve to true when every permission in `required` is granted
    ///
    /// Already-held permissions resolve immediately without a request.
    /// Otherwise the full `required` set is requested in one batch and the
    /// result is the conjunction of the individual answers.
    pub async fn ensure_granted(&self, required: &[Permission]) -> bool {
        if self.snapshot().grants_all(required) {
            return true;
        }

        let _in_flight = self.in_flight.lock().await;

        // Another caller's request may have granted everything meanwhile
        let state = self.snapshot();
        if state.grants_all(required) {
            return true;
        }

        debug!("Requesting permissions, missing: {:?}", state.missing(required));
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answers = self.provider.request_batch(required).await;

        let granted = answers.grants_all(required);
        if granted {
            info!("Permissions granted");
        } else {
            warn!("Permissions denied: {:?}", answers.missing(required));
        }
        granted
    }

    /// Continuation form of [`ensure_granted`](Self::ensure_granted)
    ///
    /// `on_result` runs synchronously when nothing is missing, otherwise on a
    /// spawned task once the request settles.
    pub fn ensure_granted_then<F>(self: &Arc<Self>, required: Vec<Permission>, on_result: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if self.snapshot().grants_all(&required) {
            on_result(true);
            return;
        }

        let gate = self.clone();
        tokio::spawn(async move {
            let granted = gate.ensure_granted(&required).await;
            on_result(granted);
        });
    }

    /// Number of batched requests issued so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}
