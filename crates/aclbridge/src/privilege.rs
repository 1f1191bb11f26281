//! crates/aclbridge/src/privilege.rs
//!
//! Scoped privilege escalation.
//!
//! The engine escalates in exactly two places: the group-override retry
//! and the chown privilege ladder. Escalation is held by a guard so it
//! is released on every exit path, early error returns included.

/// Raises and lowers the process's effective privileges.
pub trait PrivilegeBroker {
    fn raise(&self);
    fn lower(&self);
}

/// Holds raised privileges until dropped.
pub struct PrivilegeGuard<'a, B: PrivilegeBroker + ?Sized> {
    broker: &'a B,
}

impl<'a, B: PrivilegeBroker + ?Sized> PrivilegeGuard<'a, B> {
    pub fn escalate(broker: &'a B) -> Self {
        broker.raise();
        Self { broker }
    }
}

impl<B: PrivilegeBroker + ?Sized> Drop for PrivilegeGuard<'_, B> {
    fn drop(&mut self) {
        self.broker.lower();
    }
}

/// Broker for embedders that never escalate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrivileges;

impl PrivilegeBroker for NoPrivileges {
    fn raise(&self) {}

    fn lower(&self) {}
}
