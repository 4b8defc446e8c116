//! Authenticated / unauthenticated signal derived from the store's session.

use std::sync::Arc;
use tracing::{info, warn};

use pixsync_core::AuthState;
use pixsync_storage::{AuthOutcome, RemoteStore};

use crate::registry::{ListenerHandle, ListenerRegistry};

pub struct AuthTracker {
    store: Arc<dyn RemoteStore>,
    listeners: ListenerRegistry<AuthState>,
}

impl AuthTracker {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        AuthTracker {
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Recomputed on every call from whether a live session exists.
    pub fn current_state(&self) -> AuthState {
        if self.store.authorized_session().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    /// Replay the current state to `listener`, then register it.
    ///
    /// The replay is delivered before the listener is reachable by any
    /// notification. A change that lands between the replay and the
    /// registration is re-delivered once registered, so the listener never
    /// ends on a stale state.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let replayed = self.current_state();
        listener(&replayed);

        let registered = listener.clone();
        let handle = self.listeners.subscribe(move |state| registered(state));

        let now = self.current_state();
        if now != replayed {
            listener(&now);
        }
        handle
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.listeners.unsubscribe(handle);
    }

    /// Invalidate the session and tell every listener. Idempotent.
    pub fn sign_out(&self) {
        self.store.invalidate_session();
        self.notify();
    }

    /// Route an authorization result: success notifies, cancel and error
    /// both force a sign-out.
    pub fn handle_auth_outcome(&self, outcome: AuthOutcome) {
        match outcome {
            AuthOutcome::Success => {
                info!("authorization succeeded");
                self.notify();
            }
            AuthOutcome::Cancel => {
                info!("authorization cancelled");
                self.sign_out();
            }
            AuthOutcome::Error { description } => {
                warn!(error = %description, "authorization failed");
                self.sign_out();
            }
        }
    }

    fn notify(&self) {
        self.listeners.notify_all(&self.current_state());
    }
}
