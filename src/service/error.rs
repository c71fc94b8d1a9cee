use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::bidmodel::BidStatus,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Bid {0} not found")]
    BidNotFound(Uuid),

    #[error("Project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("Message {0} not found")]
    MessageNotFound(i64),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Bid already created for project {project_id}")]
    DuplicateBid { project_id: Uuid, contractor_id: Uuid },

    #[error("User {0} is not authorized to perform this action on bid {1}")]
    UnauthorizedBidAccess(Uuid, Uuid),

    #[error("User {0} is not the owner of project {1}")]
    UnauthorizedProjectAccess(Uuid, Uuid),

    #[error("User {0} is not a participant of conversation {1}")]
    NotAParticipant(Uuid, Uuid),

    #[error("User {0} is not a member of conversation {1}")]
    ParticipantNotFound(Uuid, Uuid),

    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot {action} bid {bid_id} while it is {from:?}")]
    InvalidBidTransition {
        bid_id: Uuid,
        from: BidStatus,
        action: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        match error {
            ServiceError::Database(ref e) => {
                tracing::error!("database failure: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            ServiceError::Other(ref e) => {
                tracing::error!("unexpected failure: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            _ => HttpError::new(error.to_string(), status),
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BidNotFound(_)
            | ServiceError::ProjectNotFound(_)
            | ServiceError::ConversationNotFound(_)
            | ServiceError::MessageNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::ParticipantNotFound(_, _) => StatusCode::NOT_FOUND,

            ServiceError::DuplicateBid { .. } | ServiceError::InvalidBidTransition { .. } => {
                StatusCode::CONFLICT
            }

            ServiceError::UnauthorizedBidAccess(_, _)
            | ServiceError::UnauthorizedProjectAccess(_, _)
            | ServiceError::NotAParticipant(_, _)
            | ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,

            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Database(_) | ServiceError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True when a Postgres unique constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ServiceError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}
