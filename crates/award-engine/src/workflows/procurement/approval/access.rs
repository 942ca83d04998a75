use super::super::domain::{Requisition, RoleName, UserId, VendorId};
use super::super::transition::{Action, TransitionError};

/// Resolved identity of whoever is asking for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: UserId,
    pub roles: Vec<RoleName>,
    pub vendor_id: Option<VendorId>,
    pub is_admin: bool,
}

impl ActorContext {
    pub fn new(user_id: UserId, roles: Vec<RoleName>, admin_roles: &[RoleName]) -> Self {
        let is_admin = roles.iter().any(|role| admin_roles.contains(role));
        Self {
            user_id,
            roles,
            vendor_id: None,
            is_admin,
        }
    }

    pub fn with_vendor(mut self, vendor_id: Option<VendorId>) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.roles.contains(role)
    }
}

/// The actor is the named approver or holds the role the pending status waits on.
pub fn is_current_reviewer(requisition: &Requisition, actor: &ActorContext) -> bool {
    requisition.current_approver_id.as_ref() == Some(&actor.user_id)
        || requisition
            .status
            .pending_role()
            .map_or(false, |role| actor.has_role(role))
}

/// Check the caller may perform `action`; administrators may perform any action.
///
/// `vendor` names the vendor a quotation or award response is made for.
pub fn authorize(
    action: Action,
    requisition: &Requisition,
    actor: &ActorContext,
    vendor: Option<&VendorId>,
) -> Result<(), TransitionError> {
    if actor.is_admin {
        return Ok(());
    }

    let allowed = match action {
        Action::Submit | Action::Resubmit => requisition.requester_id == actor.user_id,
        Action::Approve | Action::Reject => is_current_reviewer(requisition, actor),
        Action::SubmitQuotation | Action::AcceptAward | Action::DeclineAward => {
            vendor.is_some() && actor.vendor_id.as_ref() == vendor
        }
        Action::SubmitScores => requisition.committee_of(&actor.user_id).is_some(),
        Action::OpenBidding
        | Action::StartScoring
        | Action::CompleteScoring
        | Action::Finalize
        | Action::ReleaseAward
        | Action::ExpireResponses
        | Action::ReopenForReview
        | Action::RestartScoring => {
            requisition.procurement_officer_id.as_ref() == Some(&actor.user_id)
        }
    };

    if allowed {
        return Ok(());
    }

    let required_role = match action {
        Action::Approve | Action::Reject => requisition.status.pending_role().cloned(),
        _ => None,
    };

    Err(TransitionError::Unauthorized {
        actor: actor.user_id.clone(),
        action,
        current: requisition.status.label(),
        required_role,
    })
}
