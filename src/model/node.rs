use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::observable::{NotifyGate, Signal, Subscription};
use crate::model::value::{ContainerError, ContainerId, Value};

/// Notification state common to every container.
#[derive(Debug, Default)]
pub(crate) struct NodeCore {
    pub gate: NotifyGate,
    pub changed: Signal<()>,
    attached: AtomicBool,
}

impl NodeCore {
    /// Emit "changed" unless this node's notifications are blocked.
    pub fn notify_changed(&self) {
        if !self.gate.is_blocked() {
            self.changed.emit(&());
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Claim ownership; fails if another parent already owns this node.
    pub fn mark_attached(&self) -> Result<(), ContainerError> {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ContainerError::AlreadyAttached)
    }

    pub fn mark_detached(&self) {
        self.attached.store(false, Ordering::Release);
    }
}

/// A stored value plus, for containers, its link to the owning parent.
/// The link only holds a `Weak` reference to the parent.
pub(crate) struct Slot {
    pub value: Value,
    link: Option<Subscription>,
}

impl Slot {
    /// Check that `value` may be placed under `parent`.
    ///
    /// Run before taking the parent's lock: walking the new subtree locks
    /// its nodes.
    pub fn check(value: &Value, parent: &Arc<NodeCore>) -> Result<(), ContainerError> {
        let Some(child) = value.core() else {
            return Ok(());
        };
        if value.subtree_contains(ContainerId::of(parent)) {
            return Err(ContainerError::WouldCycle);
        }
        if child.is_attached() {
            return Err(ContainerError::AlreadyAttached);
        }
        Ok(())
    }

    /// Take ownership of `value` on behalf of `parent`.
    pub fn attach(value: Value, parent: &Arc<NodeCore>) -> Result<Slot, ContainerError> {
        let link = match value.core() {
            None => None,
            Some(child) => {
                child.mark_attached()?;
                let weak = Arc::downgrade(parent);
                Some(child.changed.subscribe(move |_| {
                    if let Some(parent) = weak.upgrade() {
                        parent.notify_changed();
                    }
                }))
            }
        };
        Ok(Slot { value, link })
    }

    /// Unwire from the parent and hand the value back.
    pub fn detach(mut self) -> Value {
        self.release();
        std::mem::replace(&mut self.value, Value::Null)
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            drop(link);
            if let Some(core) = self.value.core() {
                core.mark_detached();
            }
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.release();
    }
}

/// Validate a whole batch of incoming values for a `replace`.
///
/// `current` holds the ids of containers the parent owns right now; those
/// may be reused since the replace detaches them first.
pub(crate) fn check_batch<'a>(
    values: impl IntoIterator<Item = &'a Value>,
    parent: &Arc<NodeCore>,
    current: &[ContainerId],
) -> Result<(), ContainerError> {
    let mut seen: Vec<ContainerId> = Vec::new();
    for value in values {
        let Some(child) = value.core() else {
            continue;
        };
        let id = ContainerId::of(child);
        if seen.contains(&id) {
            return Err(ContainerError::AlreadyAttached);
        }
        seen.push(id);
        if value.subtree_contains(ContainerId::of(parent)) {
            return Err(ContainerError::WouldCycle);
        }
        if child.is_attached() && !current.contains(&id) {
            return Err(ContainerError::AlreadyAttached);
        }
    }
    Ok(())
}
