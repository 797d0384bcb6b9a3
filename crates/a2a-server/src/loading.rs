//! Loading context: the deployment's provider registry, installed per thread.
//!
//! Handler code resolves pluggable providers through
//! [`LoadingContext::current`]. Runtime worker threads do not carry the
//! deployment's context on their own, so callers install it for the duration
//! of a call with [`LoadingContext::enter`] or, for futures, around every
//! poll with [`LoadingContext::scope`].

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;

thread_local! {
    static CURRENT: RefCell<Option<LoadingContext>> = const { RefCell::new(None) };
}

type Provider = Arc<dyn Any + Send + Sync>;

struct Inner {
    name: String,
    providers: RwLock<HashMap<TypeId, Provider>>,
}

/// Cheaply cloneable handle; clones compare equal.
#[derive(Clone)]
pub struct LoadingContext {
    inner: Arc<Inner>,
}

impl LoadingContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                providers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register the provider for `T`, replacing any previous one.
    pub fn register<T: Any + Send + Sync>(&self, provider: T) {
        self.inner
            .providers
            .write()
            .insert(TypeId::of::<T>(), Arc::new(provider));
    }

    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let provider = self.inner.providers.read().get(&TypeId::of::<T>())?.clone();
        provider.downcast::<T>().ok()
    }

    /// The context installed on this thread, if any.
    pub fn current() -> Option<LoadingContext> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Install `self` on this thread until the guard is dropped.
    pub fn enter(&self) -> ContextGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        ContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Run `future` with `self` installed during every poll.
    pub fn scope<F>(&self, future: F) -> Scoped<F>
    where
        F: Future + Unpin,
    {
        Scoped {
            context: self.clone(),
            future,
        }
    }
}

impl PartialEq for LoadingContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for LoadingContext {}

impl std::fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingContext")
            .field("name", &self.inner.name)
            .field("providers", &self.inner.providers.read().len())
            .finish()
    }
}

/// Restores the previously installed context when dropped, unwinding included.
///
/// Tied to the thread it was created on.
pub struct ContextGuard {
    previous: Option<LoadingContext>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Future returned by [`LoadingContext::scope`].
pub struct Scoped<F> {
    context: LoadingContext,
    future: F,
}

impl<F: Future + Unpin> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _guard = this.context.enter();
        Pin::new(&mut this.future).poll(cx)
    }
}
