use shared::{
    domain::{EventId, SubjectCode},
    error::DomainError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChoiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("event {event_id} is not offered for subject {subject}")]
    UnknownEvent {
        subject: SubjectCode,
        event_id: EventId,
    },
    #[error("subject {subject} has no tutorial choices")]
    NoChoices { subject: SubjectCode },
    #[error("a cart operation for subject {subject} is still in flight")]
    OperationInFlight { subject: SubjectCode },
    #[error("cart request for subject {subject} failed: {source}")]
    Cart {
        subject: SubjectCode,
        source: anyhow::Error,
    },
    #[error("failed to read cart: {source}")]
    CartUnavailable { source: anyhow::Error },
    #[error("failed to persist tutorial choices: {source}")]
    Persistence { source: anyhow::Error },
}
