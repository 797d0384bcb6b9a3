//! Request context: per-request state threaded through handler calls.
//!
//! The transport builds one [`RequestContext`] per inbound HTTP request and
//! passes it to every handler operation. Identity, state and negotiated
//! extensions are fixed once [`RequestContextBuilder::build`] returns; the only
//! mutable part is the cancel hook, which the component that opens an event
//! stream registers so the SSE adapter can release per-subscriber resources
//! when the client goes away.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::user::User;

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("a cancel hook is already registered for request {0}")]
    CancelHookAlreadySet(Uuid),
}

enum HookState {
    Empty,
    Armed(CancelHook),
    /// Cancellation was requested; `hook_ran` tells whether a hook consumed it.
    Cancelled { hook_ran: bool },
}

/// Context for a single request.
pub struct RequestContext {
    request_id: Uuid,
    user: User,
    state: HashMap<String, Value>,
    requested_extensions: BTreeSet<String>,
    cancel: Mutex<HookState>,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Correlation id used in logs.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn requested_extensions(&self) -> &BTreeSet<String> {
        &self.requested_extensions
    }

    pub fn is_extension_requested(&self, uri: &str) -> bool {
        self.requested_extensions.contains(uri)
    }

    /// Register the callback that releases this request's streaming resources.
    ///
    /// Only one hook may be registered. If the request was already cancelled
    /// before registration, the hook runs immediately.
    pub fn set_cancel_hook<F>(&self, hook: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.cancel.lock();
        match &*slot {
            HookState::Empty => {
                *slot = HookState::Armed(Box::new(hook));
                Ok(())
            }
            HookState::Cancelled { hook_ran: false } => {
                *slot = HookState::Cancelled { hook_ran: true };
                drop(slot);
                hook();
                Ok(())
            }
            HookState::Armed(_) | HookState::Cancelled { hook_ran: true } => {
                Err(ContextError::CancelHookAlreadySet(self.request_id))
            }
        }
    }

    /// Run the cancel hook if one is registered and has not run yet.
    ///
    /// Returns `true` only for the call that actually ran the hook; every
    /// other call is a no-op.
    pub fn invoke_cancel_hook(&self) -> bool {
        let hook = {
            let mut slot = self.cancel.lock();
            match std::mem::replace(&mut *slot, HookState::Cancelled { hook_ran: true }) {
                HookState::Armed(hook) => hook,
                HookState::Empty => {
                    *slot = HookState::Cancelled { hook_ran: false };
                    return false;
                }
                previous @ HookState::Cancelled { .. } => {
                    *slot = previous;
                    return false;
                }
            }
        };
        hook();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.cancel.lock(), HookState::Cancelled { .. })
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("user", &self.user)
            .field("state", &self.state)
            .field("requested_extensions", &self.requested_extensions)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Collects identity, state and extensions before the context is frozen.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    user: User,
    state: HashMap<String, Value>,
    requested_extensions: BTreeSet<String>,
}

impl RequestContextBuilder {
    pub fn user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    pub fn state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn requested_extensions<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_extensions
            .extend(uris.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> RequestContext {
        RequestContext {
            request_id: Uuid::new_v4(),
            user: self.user,
            state: self.state,
            requested_extensions: self.requested_extensions,
            cancel: Mutex::new(HookState::Empty),
        }
    }
}
