use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
};

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::intent::{
    error::{AbortKind, AbortReason, deadline_exceeded, externally_cancelled},
    types::{ContextId, ContextState, Constraints, Intent, Params},
};

const BACKGROUND_INTENT: &str = "Background";

struct ContextCore {
    state: ContextState,
    err_state: Option<AbortReason>,
    params: Params,
}

struct ContextInner {
    id: ContextId,
    name: String,
    depth: usize,
    deadline: Option<Instant>,
    parent: Option<Weak<ContextInner>>,
    children: Mutex<Vec<Arc<ContextInner>>>,
    core: Mutex<ContextCore>,
    done: CancellationToken,
    // Fired on drop so a pending deadline timer does not outlive the node.
    released: CancellationToken,
}

impl ContextInner {
    fn new(
        intent: Intent,
        deadline: Option<Instant>,
        parent: Option<&Arc<ContextInner>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::now_v7().to_string(),
            name: intent.name,
            depth: parent.map_or(0, |parent| parent.depth + 1),
            deadline,
            parent: parent.map(Arc::downgrade),
            children: Mutex::new(Vec::new()),
            core: Mutex::new(ContextCore {
                state: ContextState::Pending,
                err_state: None,
                params: intent.params,
            }),
            done: CancellationToken::new(),
            released: CancellationToken::new(),
        })
    }

    /// First terminal transition wins; the caller fires `done`.
    fn transition(&self, target: ContextState, reason: Option<AbortReason>) -> bool {
        let mut core = self.core.lock().expect("lock poisoned");
        if core.state.is_terminal() {
            return false;
        }
        core.state = target;
        core.err_state = reason;
        true
    }

    fn state(&self) -> ContextState {
        self.core.lock().expect("lock poisoned").state
    }

    fn children_snapshot(&self) -> Vec<Arc<ContextInner>> {
        self.children.lock().expect("lock poisoned").clone()
    }

    fn is_overdue(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.released.cancel();
    }
}

/// A node in the intent-context tree.
///
/// Cloning is cheap and yields another handle to the same node. Parents own
/// their children; children only hold a weak link back up.
#[derive(Clone)]
pub struct IntentContext {
    inner: Arc<ContextInner>,
}

impl IntentContext {
    pub fn background() -> Self {
        let inner = ContextInner::new(Intent::new(BACKGROUND_INTENT), None, None);
        tracing::debug!(target: "intent_context", id = %inner.id, "background_created");
        Self { inner }
    }

    pub fn with_intent(&self, intent: Intent, constraints: Constraints) -> (Self, CancelHandle) {
        let child = Self {
            inner: ContextInner::new(intent, constraints.deadline, Some(&self.inner)),
        };
        self.inner
            .children
            .lock()
            .expect("lock poisoned")
            .push(Arc::clone(&child.inner));

        tracing::debug!(
            target: "intent_context",
            id = %child.id(),
            name = %child.name(),
            parent_id = %self.id(),
            depth = child.depth(),
            deadline = ?constraints.deadline,
            "context_created"
        );

        // Registered first, checked second: an abort racing this call either
        // sees the child in the list or is seen here.
        self.enforce_deadlines();
        let parent_core = {
            let core = self.inner.core.lock().expect("lock poisoned");
            (core.state, core.err_state.clone())
        };
        match parent_core {
            (ContextState::Pending, _) => {
                if let Some(deadline) = constraints.deadline {
                    child.arm_deadline(deadline);
                }
            }
            (ContextState::Aborted, Some(reason)) => {
                child.abort_with(reason);
            }
            (ContextState::Aborted, None) | (ContextState::Done, _) => {
                child.abort_with(AbortReason::new(
                    AbortKind::ExternallyCancelled,
                    "parent context already fulfilled",
                    self.id(),
                ));
            }
        }

        let handle = CancelHandle {
            context: child.clone(),
        };
        (child, handle)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn state(&self) -> ContextState {
        self.enforce_deadlines();
        self.inner.state()
    }

    pub fn err_state(&self) -> Option<AbortReason> {
        self.enforce_deadlines();
        self.inner
            .core
            .lock()
            .expect("lock poisoned")
            .err_state
            .clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Resolves once the context reaches any terminal state.
    pub fn done(&self) -> WaitForCancellationFutureOwned {
        self.inner.done.clone().cancelled_owned()
    }

    pub fn intent(&self) -> Intent {
        Intent {
            name: self.inner.name.clone(),
            params: self.params(),
        }
    }

    pub fn params(&self) -> Params {
        self.inner.core.lock().expect("lock poisoned").params.clone()
    }

    pub fn update_params<R>(&self, update: impl FnOnce(&mut Params) -> R) -> R {
        let mut core = self.inner.core.lock().expect("lock poisoned");
        update(&mut core.params)
    }

    pub fn fulfill(&self) -> bool {
        if self.enforce_deadlines() {
            return false;
        }
        if !self.inner.transition(ContextState::Done, None) {
            return false;
        }
        self.inner.done.cancel();
        tracing::debug!(target: "intent_context", id = %self.id(), name = %self.name(), "context_fulfilled");
        true
    }

    /// Aborts this context and every non-terminal descendant.
    ///
    /// Returns whether this context itself transitioned. When it was already
    /// terminal its own state is kept, but pending descendants are still
    /// aborted with the given reason.
    pub fn abort(&self, kind: AbortKind, message: impl Into<String>) -> bool {
        self.abort_with(AbortReason::new(kind, message, self.id()))
    }

    pub(crate) fn abort_with(&self, reason: AbortReason) -> bool {
        let transitioned = self
            .inner
            .transition(ContextState::Aborted, Some(reason.clone()));

        let mut fired = Vec::new();
        if transitioned {
            fired.push(Arc::clone(&self.inner));
        }
        let mut pending = self.inner.children_snapshot();
        while let Some(node) = pending.pop() {
            if node.transition(ContextState::Aborted, Some(reason.clone())) {
                fired.push(Arc::clone(&node));
            }
            pending.extend(node.children_snapshot());
        }

        // Leaves signal before their ancestors.
        for node in fired.iter().rev() {
            node.done.cancel();
        }

        if !fired.is_empty() {
            tracing::debug!(
                target: "intent_context",
                id = %self.id(),
                name = %self.name(),
                kind = reason.kind.as_str(),
                reason = %reason.message,
                origin = %reason.origin,
                origin_aborted = transitioned,
                aborted = fired.len(),
                "context_aborted"
            );
        }
        transitioned
    }

    pub fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Topmost ancestor that is still alive.
    pub fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn children(&self) -> Vec<Self> {
        self.inner
            .children_snapshot()
            .into_iter()
            .map(|inner| Self { inner })
            .collect()
    }

    /// This context followed by all of its descendants, pre-order.
    pub fn subtree(&self) -> Vec<Self> {
        let mut nodes = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
            nodes.push(node);
        }
        nodes
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let (state, err_state, params) = {
            self.enforce_deadlines();
            let core = self.inner.core.lock().expect("lock poisoned");
            (core.state, core.err_state.clone(), core.params.clone())
        };
        ContextSnapshot {
            id: self.id().to_string(),
            name: self.name().to_string(),
            state,
            err_state,
            params,
            children: self
                .children()
                .iter()
                .map(IntentContext::snapshot)
                .collect(),
        }
    }

    /// Earliest deadline still able to abort this context, its own or a
    /// pending ancestor's.
    pub(crate) fn pending_deadline(&self) -> Option<Instant> {
        let mut earliest: Option<Instant> = None;
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(deadline) = node.inner.deadline
                && node.inner.state() == ContextState::Pending
            {
                earliest = Some(earliest.map_or(deadline, |at| at.min(deadline)));
            }
            current = node.parent();
        }
        earliest
    }

    /// Expires this context or any ancestor whose deadline has passed.
    /// Returns whether this context is aborted afterwards.
    fn enforce_deadlines(&self) -> bool {
        let now = Instant::now();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.inner.is_overdue(now) && node.inner.state() == ContextState::Pending {
                node.expire();
            }
            current = node.parent();
        }
        self.inner.state() == ContextState::Aborted
    }

    fn expire(&self) {
        if self.abort_with(deadline_exceeded(self.id())) {
            tracing::info!(
                target: "intent_context",
                id = %self.id(),
                name = %self.name(),
                "context_deadline_exceeded"
            );
        }
    }

    fn arm_deadline(&self, deadline: Instant) {
        if self.inner.is_overdue(Instant::now()) {
            self.expire();
            return;
        }

        // Without a runtime the deadline is still enforced on every read.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(target: "intent_context", id = %self.id(), "deadline_timer_unavailable");
            return;
        };

        let node = Arc::downgrade(&self.inner);
        let done = self.inner.done.clone();
        let released = self.inner.released.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = done.cancelled() => {}
                _ = released.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(inner) = node.upgrade() {
                        IntentContext { inner }.expire();
                    }
                }
            }
        });
    }
}

impl fmt::Debug for IntentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl PartialEq for IntentContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for IntentContext {}

/// Cancels the context it was created with. Safe to call any number of
/// times, including after the context has terminated.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    context: IntentContext,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.context.abort_with(externally_cancelled(self.context.id()));
    }

    pub fn context(&self) -> &IntentContext {
        &self.context
    }

    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard {
            handle: self,
            armed: true,
        }
    }
}

/// Cancels on drop unless disarmed.
#[derive(Debug)]
pub struct CancelGuard {
    handle: CancelHandle,
    armed: bool,
}

impl CancelGuard {
    pub fn disarm(mut self) -> CancelHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.cancel();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub id: ContextId,
    pub name: String,
    pub state: ContextState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_state: Option<AbortReason>,
    pub params: Params,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContextSnapshot>,
}

impl ContextSnapshot {
    pub fn find(&self, name: &str) -> Option<&ContextSnapshot> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn count_in_state(&self, state: ContextState) -> usize {
        let own = usize::from(self.state == state);
        own + self
            .children
            .iter()
            .map(|child| child.count_in_state(state))
            .sum::<usize>()
    }
}
