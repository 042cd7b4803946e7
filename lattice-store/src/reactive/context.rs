//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This is the ambient "current tracking context": when a source is read,
//! the computation on top of the stack becomes one of its dependents.
//!
//! # Implementation
//!
//! A thread-local stack of frames. Entering a computation pushes a tracking
//! frame; [`untracked`] pushes a detached frame that hides every frame below
//! it. Both are popped by RAII guards, so the previous context is restored
//! even when the computation panics.

use std::cell::RefCell;

use super::id::{SourceId, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
enum Frame {
    Tracking {
        subscriber_id: SubscriberId,
        /// Sources read during this computation, in read order.
        dependencies: Vec<SourceId>,
    },
    Detached,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any source that is read will register
    /// the subscriber as a dependent. The context is exited when the
    /// returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Tracking {
                subscriber_id,
                dependencies: Vec::new(),
            });
        });

        Self {
            subscriber_id: Some(subscriber_id),
        }
    }

    fn detach() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Frame::Detached));
        Self { subscriber_id: None }
    }

    /// Check if a tracking context is active.
    ///
    /// False outside any computation and inside [`untracked`].
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { subscriber_id, .. }) => Some(*subscriber_id),
            _ => None,
        })
    }

    /// Record a dependency on the given source.
    pub fn track_dependency(source_id: SourceId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(Frame::Tracking { dependencies, .. }) = stack.borrow_mut().last_mut() {
                dependencies.push(source_id);
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<SourceId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { dependencies, .. }) => dependencies.clone(),
            _ => Vec::new(),
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(Frame::Tracking { subscriber_id, .. }) = popped {
                debug_assert_eq!(
                    Some(subscriber_id),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` with no active tracking context.
///
/// Reads inside `f` never create dependencies, even when called from an
/// effect or memo.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::detach();
    f()
}
