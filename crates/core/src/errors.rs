use thiserror::Error;

use crate::acceptance::TransitionRejection;
use crate::domain::lead::LeadStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid lead status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: LeadStatus, to: LeadStatus },
    #[error(transparent)]
    Acceptance(#[from] TransitionRejection),
    #[error("lead has no facility, distribution requires one")]
    MissingFacility,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::DomainError;
    use crate::acceptance::TransitionRejection;
    use crate::domain::lead::LeadStatus;

    #[test]
    fn rejections_convert_transparently() {
        let error: DomainError =
            TransitionRejection::NotPending { status: LeadStatus::Contacted }.into();
        assert!(matches!(error, DomainError::Acceptance(_)));
        assert!(error.to_string().contains("contacted"));
    }
}
