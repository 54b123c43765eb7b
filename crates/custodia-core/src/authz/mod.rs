//! Stateless authorization gate.
//!
//! The gate is a pure policy function over the closed role/capability table.
//! Both workflows consult it before any state transition; no caller ever
//! re-checks roles ad hoc. Denials carry an enumerated reason so clients can
//! explain the failure without the core leaking internal state.

use serde::{Deserialize, Serialize};

use crate::identity::{Role, User};

/// An action subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Register a new seizure.
    RegisterSeizure,
    /// Request a transfer between locations.
    RequestTransfer,
    /// Approve or reject a pending transfer.
    ApproveTransfer,
    /// Receive an approved transfer at its destination.
    ReceiveTransfer,
    /// Open a destruction request.
    RequestDestruction,
    /// Approve or reject a destruction request at the given level.
    ApproveDestruction {
        /// The approval level being decided.
        level: u32,
    },
    /// Read the custody audit log.
    ViewAuditLog,
    /// Create or deactivate user accounts.
    ManageUsers,
    /// Register storage locations.
    ManageLocations,
}

/// Enumerated reasons for a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The actor's role does not carry the capability.
    RoleNotPermitted,
    /// The actor requested the thing they are trying to approve.
    SelfApprovalForbidden,
    /// The target resource is not in the state the action requires.
    ResourceNotInRequiredState,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::RoleNotPermitted => "role not permitted",
            Self::SelfApprovalForbidden => "self-approval forbidden",
            Self::ResourceNotInRequiredState => "resource not in required state",
        };
        f.write_str(text)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is denied for the given reason.
    Deny(DenyReason),
}

impl Decision {
    /// True when the decision is [`Decision::Allow`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Context about the resource an action targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceContext<'a> {
    /// Username of whoever requested the resource, for the
    /// separation-of-duties rule on approvals.
    pub requested_by: Option<&'a str>,
}

impl<'a> ResourceContext<'a> {
    /// Context for an action with no target resource.
    #[must_use]
    pub const fn none() -> Self {
        Self { requested_by: None }
    }

    /// Context for approving a resource requested by `username`.
    #[must_use]
    pub const fn requested_by(username: &'a str) -> Self {
        Self {
            requested_by: Some(username),
        }
    }
}

/// Whether `role` carries the capability for `action`, per the static table.
#[must_use]
pub const fn role_permits(role: Role, action: Action) -> bool {
    match action {
        Action::RegisterSeizure => {
            matches!(role, Role::Admin | Role::Supervisor | Role::FieldOfficer)
        },
        Action::RequestTransfer => matches!(
            role,
            Role::Admin | Role::Supervisor | Role::WarehouseManager | Role::FieldOfficer
        ),
        Action::ApproveTransfer => matches!(role, Role::Admin | Role::Supervisor),
        Action::ReceiveTransfer => matches!(role, Role::Admin | Role::WarehouseManager),
        Action::RequestDestruction => matches!(role, Role::Admin | Role::Supervisor),
        Action::ApproveDestruction { level } => match role {
            Role::Admin => true,
            Role::Supervisor => level == 1,
            _ => false,
        },
        Action::ViewAuditLog => matches!(role, Role::Admin | Role::Supervisor | Role::Auditor),
        Action::ManageUsers | Action::ManageLocations => matches!(role, Role::Admin),
    }
}

/// Evaluates the gate for one actor and action.
///
/// Deactivated accounts are denied outright. Approvals additionally enforce
/// separation of duties: an actor may never approve a request they
/// themselves made, whatever their role.
#[must_use]
pub fn authorize(actor: &User, action: Action, ctx: &ResourceContext<'_>) -> Decision {
    if !actor.active {
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }

    if matches!(
        action,
        Action::ApproveTransfer | Action::ApproveDestruction { .. }
    ) {
        if let Some(requester) = ctx.requested_by {
            if requester == actor.username {
                return Decision::Deny(DenyReason::SelfApprovalForbidden);
            }
        }
    }

    if role_permits(actor.role, action) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::RoleNotPermitted)
    }
}
