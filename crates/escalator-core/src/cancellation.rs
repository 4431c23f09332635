//! Hierarchical Cancellation Tokens
//!
//! A [`CancellationToken`] is an advisory flag plus a list of callbacks.
//! Tokens form trees: a parent owns its attached children and cancels them
//! when it is cancelled, while each child keeps only a `Weak` back-reference
//! to its parent, used to deregister itself on detach or cancel. Cancelling a
//! child never reaches its parent or siblings.
//!
//! Cancellation never interrupts work. Cooperating code polls
//! [`CancellationToken::is_cancelled`], registers [`CancellationToken::on_cancel`]
//! or awaits [`CancellationToken::cancelled`].

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tracing::warn;

type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

// ----------------------------------------------------------------------------
// Token Internals
// ----------------------------------------------------------------------------

#[derive(Default)]
struct TokenState {
    callbacks: Vec<(u64, CancelCallback)>,
    next_callback_id: u64,
    /// Attached children, owned by this token
    children: Vec<CancellationToken>,
    /// Non-owning link used only to deregister on detach or cancel
    parent: Option<Weak<TokenInner>>,
    /// Registrations held on source tokens (linked tokens only)
    links: Vec<CancelRegistration>,
    disposed: bool,
}

struct TokenInner {
    cancelled: AtomicBool,
    state: Mutex<TokenState>,
    notify: Notify,
}

impl TokenInner {
    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_isolated(callback: CancelCallback) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("Cancellation callback panicked; remaining callbacks still run");
    }
}

// ----------------------------------------------------------------------------
// Cancellation Token
// ----------------------------------------------------------------------------

/// Shared handle to a cancellation flag. Clones refer to the same token.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create an uncancelled root token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                state: Mutex::new(TokenState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Token cancelled as soon as any of `sources` is; pre-cancelled if one
    /// of them already is
    pub fn linked(sources: &[&CancellationToken]) -> Self {
        let linked = CancellationToken::new();

        if sources.iter().any(|source| source.is_cancelled()) {
            linked.cancel();
            return linked;
        }

        let links: Vec<CancelRegistration> = sources
            .iter()
            .map(|source| {
                let target = Arc::downgrade(&linked.inner);
                source.on_cancel(move || {
                    if let Some(inner) = target.upgrade() {
                        CancellationToken { inner }.cancel();
                    }
                })
            })
            .collect();

        let stale = {
            let mut state = linked.inner.lock();
            if linked.is_cancelled() || state.disposed {
                links
            } else {
                state.links = links;
                Vec::new()
            }
        };
        for link in stale {
            link.unsubscribe();
        }

        linked
    }

    /// Sticky once set
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token and every attached descendant.
    ///
    /// Callbacks run synchronously, once each, in registration order. A
    /// panicking callback is logged and does not stop the others. Repeated
    /// calls are no-ops.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let (callbacks, children, links, parent) = {
            let mut state = self.inner.lock();
            (
                mem::take(&mut state.callbacks),
                mem::take(&mut state.children),
                mem::take(&mut state.links),
                state.parent.take(),
            )
        };

        // A cancelled child has nothing left to receive from its parent
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            parent.lock().children.retain(|child| !self.same_token(child));
        }

        self.inner.notify.notify_waiters();

        for (_, callback) in callbacks {
            run_isolated(callback);
        }
        for child in children {
            child.cancel();
        }
        for link in links {
            link.unsubscribe();
        }
    }

    /// Register `callback` to run on cancellation.
    ///
    /// Runs immediately when the token is already cancelled. The returned
    /// registration can be unsubscribed any number of times.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.lock();

        if self.is_cancelled() {
            drop(state);
            run_isolated(Box::new(callback));
            return CancelRegistration::inert();
        }
        if state.disposed {
            return CancelRegistration::inert();
        }

        let id = state.next_callback_id;
        state.next_callback_id += 1;
        state.callbacks.push((id, Box::new(callback)));

        CancelRegistration {
            token: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Create a child that is cancelled whenever this token is.
    ///
    /// A child of an already-cancelled token is born cancelled. The parent
    /// owns the child until the child is cancelled, detached or disposed;
    /// dropping every outside handle to an uncancelled child does not release
    /// it.
    pub fn create_child(&self) -> CancellationToken {
        let child = CancellationToken::new();

        let mut state = self.inner.lock();
        if self.is_cancelled() {
            drop(state);
            child.cancel();
            return child;
        }
        if state.disposed {
            return child;
        }

        child.inner.lock().parent = Some(Arc::downgrade(&self.inner));
        state.children.push(child.clone());
        child
    }

    /// Permanently sever the link to the parent; later parent cancellation
    /// no longer reaches this token
    pub fn detach_from_parent(&self) {
        let parent = self.inner.lock().parent.take();

        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            parent.lock().children.retain(|child| !self.same_token(child));
        }
    }

    /// Detach and release every reference this token holds
    pub fn dispose(&self) {
        self.detach_from_parent();

        let (callbacks, children, links) = {
            let mut state = self.inner.lock();
            state.disposed = true;
            (
                mem::take(&mut state.callbacks),
                mem::take(&mut state.children),
                mem::take(&mut state.links),
            )
        };

        for child in &children {
            child.inner.lock().parent = None;
        }
        for link in links {
            link.unsubscribe();
        }
        drop(callbacks);
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Number of attached children
    pub fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Whether both handles refer to the same token
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Registration
// ----------------------------------------------------------------------------

/// Handle returned by [`CancellationToken::on_cancel`]
#[derive(Debug, Clone)]
pub struct CancelRegistration {
    token: Weak<TokenInner>,
    id: Option<u64>,
}

impl CancelRegistration {
    fn inert() -> Self {
        Self {
            token: Weak::new(),
            id: None,
        }
    }

    /// Remove the callback if it has not run yet
    pub fn unsubscribe(&self) {
        let (Some(id), Some(token)) = (self.id, self.token.upgrade()) else {
            return;
        };
        let removed = {
            let mut state = token.lock();
            state
                .callbacks
                .iter()
                .position(|(callback_id, _)| *callback_id == id)
                .map(|index| state.callbacks.remove(index))
        };
        drop(removed);
    }
}

// ----------------------------------------------------------------------------
// Token Source
// ----------------------------------------------------------------------------

/// Owning side of a token; disposes the token when dropped
#[derive(Debug)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Source whose token is attached as a child of `parent`
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.create_child(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn create_child(&self) -> CancellationToken {
        self.token.create_child()
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationTokenSource {
    fn drop(&mut self) {
        self.token.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = {
            let count = count.clone();
            move || count.load(Ordering::SeqCst)
        };
        (count, reader)
    }

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_runs_callbacks_once_in_order() {
        let token = CancellationToken::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for index in 0..3 {
            let order = order.clone();
            token.on_cancel(move || order.lock().unwrap().push(index));
        }

        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let token = CancellationToken::new();
        let (count, read) = counter();

        token.on_cancel(|| panic!("callback failure"));
        {
            let count = count.clone();
            token.on_cancel(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        token.cancel();
        assert_eq!(read(), 1);
    }

    #[test]
    fn test_on_cancel_after_cancel_fires_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let (count, read) = counter();
        token.on_cancel(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(read(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let token = CancellationToken::new();
        let (count, read) = counter();

        let registration = {
            let count = count.clone();
            token.on_cancel(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let other = {
            let count = count.clone();
            token.on_cancel(move || {
                count.fetch_add(10, Ordering::SeqCst);
            })
        };

        registration.unsubscribe();
        registration.unsubscribe();
        token.cancel();

        assert_eq!(read(), 10);
        other.unsubscribe();
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.create_child();
        let grandchild = child.create_child();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent_or_sibling() {
        let parent = CancellationToken::new();
        let first = parent.create_child();
        let second = parent.create_child();

        first.cancel();
        assert!(!parent.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_cancelled_children_leave_parent() {
        let parent = CancellationToken::new();
        for _ in 0..100 {
            parent.create_child().cancel();
        }
        let kept = parent.create_child();

        assert_eq!(parent.child_count(), 1);
        assert!(!parent.is_cancelled());

        parent.cancel();
        assert!(kept.is_cancelled());
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn test_child_of_cancelled_parent_is_born_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.create_child().is_cancelled());
    }

    #[test]
    fn test_detached_child_is_excluded() {
        let parent = CancellationToken::new();
        let child = parent.create_child();
        assert_eq!(parent.child_count(), 1);

        child.detach_from_parent();
        assert_eq!(parent.child_count(), 0);

        parent.cancel();
        assert!(!child.is_cancelled());
    }

    #[test]
    fn test_dispose_releases_callbacks_and_link() {
        let parent = CancellationToken::new();
        let child = parent.create_child();
        let (count, read) = counter();
        child.on_cancel(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        child.dispose();
        assert!(child.is_disposed());
        parent.cancel();

        assert!(!child.is_cancelled());
        assert_eq!(read(), 0);
    }

    #[test]
    fn test_linked_token_follows_any_source() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let linked = CancellationToken::linked(&[&a, &b]);

        assert!(!linked.is_cancelled());
        b.cancel();
        assert!(linked.is_cancelled());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_linked_token_precancelled() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        a.cancel();

        assert!(CancellationToken::linked(&[&a, &b]).is_cancelled());
    }

    #[test]
    fn test_disposed_linked_token_ignores_sources() {
        let a = CancellationToken::new();
        let linked = CancellationToken::linked(&[&a]);
        linked.dispose();

        a.cancel();
        assert!(!linked.is_cancelled());
    }

    #[test]
    fn test_source_disposes_on_drop() {
        let parent = CancellationToken::new();
        let token = {
            let source = CancellationTokenSource::child_of(&parent);
            assert_eq!(parent.child_count(), 1);
            source.token()
        };

        assert_eq!(parent.child_count(), 0);
        assert!(token.is_disposed());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel();
        waiter.await.unwrap();
    }
}
