use std::time::Duration;

use chrono::Utc;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    identity::{IdentityProvider, IdentityState},
    models::Session,
};

/// GateState
///
/// Access state of a protected surface. Starts at `Verifying` and settles on one of the two
/// terminal states once the identity provider has answered.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Verifying,
    Authorized(Session),
    Unauthorized,
}

impl GateState {
    /// True once the provider has answered (either way).
    pub fn is_settled(&self) -> bool {
        !matches!(self, GateState::Verifying)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            GateState::Authorized(session) => Some(session),
            _ => None,
        }
    }

    /// Wire name used for SSE event types and logs.
    pub fn label(&self) -> &'static str {
        match self {
            GateState::Verifying => "verifying",
            GateState::Authorized(_) => "authorized",
            GateState::Unauthorized => "unauthorized",
        }
    }
}

/// resolve
///
/// One-shot evaluation of an access token. Fails closed: a missing token, an expired session
/// and every provider error (including an unconfigured provider) resolve to `Unauthorized`.
pub async fn resolve(identity: &dyn IdentityProvider, token: Option<&str>) -> GateState {
    let Some(token) = token else {
        tracing::debug!("no access token presented");
        return GateState::Unauthorized;
    };

    match identity.get_session(token).await {
        Ok(session) if session.expires_at > Utc::now() => GateState::Authorized(session),
        Ok(session) => {
            tracing::debug!(user_id = %session.user_id, "session already expired");
            GateState::Unauthorized
        }
        Err(e) => {
            tracing::warn!("session check failed, denying access: {e}");
            GateState::Unauthorized
        }
    }
}

/// MountedGate
///
/// Long-lived gate for a connected admin client.
///
/// Publishes its state on a `watch` channel that starts at `Verifying`. The identity
/// subscription is taken before the first evaluation so no sign-out can slip between the two.
/// Afterwards the gate re-evaluates on every session-change notification and when the current
/// session expires. Dropping or unmounting the gate stops the task and with it the
/// subscription.
pub struct MountedGate {
    state: watch::Receiver<GateState>,
    task: Option<JoinHandle<()>>,
}

impl MountedGate {
    pub fn mount(identity: IdentityState, token: Option<String>) -> Self {
        let mut subscription = identity.subscribe();
        let (tx, state) = watch::channel(GateState::Verifying);

        let task = tokio::spawn(async move {
            loop {
                let next = resolve(identity.as_ref(), token.as_deref()).await;
                let expires_in = next.session().map(|session| {
                    (session.expires_at - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO)
                });

                // Only publish transitions.
                tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });

                let expiry = async {
                    match expires_in {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    event = subscription.recv() => {
                        tracing::debug!(?event, "session change, re-evaluating gate");
                    }
                    _ = expiry => {
                        tracing::debug!("session expired, re-evaluating gate");
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        Self {
            state,
            task: Some(task),
        }
    }

    /// The latest published state.
    pub fn current(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// A receiver observing every future transition.
    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.state.clone()
    }

    /// Waits until the gate leaves `Verifying`. Resolves to `Unauthorized` if the gate task
    /// is gone before it settled.
    pub async fn settled(&self) -> GateState {
        let mut rx = self.state.clone();
        match rx.wait_for(GateState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => GateState::Unauthorized,
        }
    }

    /// Stops re-evaluation and waits until the identity subscription is released.
    pub async fn unmount(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for MountedGate {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
