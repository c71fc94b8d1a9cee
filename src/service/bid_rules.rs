// service/bid_rules.rs
//! Bid state machine. Pure functions evaluated inside the transaction that holds the bid row lock.
use uuid::Uuid;

use crate::{
    models::bidmodel::{BidStatus, BidWithOwner},
    service::error::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidAction {
    Submit,
    Withdraw,
    Accept,
    Reject,
    MarkViewed,
    Start,
}

/// Which side of the bid an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidActor {
    Contractor,
    ProjectOwner,
}

impl BidAction {
    pub fn name(&self) -> &'static str {
        match self {
            BidAction::Submit => "submit",
            BidAction::Withdraw => "withdraw",
            BidAction::Accept => "accept",
            BidAction::Reject => "reject",
            BidAction::MarkViewed => "mark viewed",
            BidAction::Start => "start project from",
        }
    }

    pub fn actor(&self) -> BidActor {
        match self {
            BidAction::Submit | BidAction::Withdraw => BidActor::Contractor,
            BidAction::Accept | BidAction::Reject | BidAction::MarkViewed | BidAction::Start => {
                BidActor::ProjectOwner
            }
        }
    }

    /// `Ok(Some(next))` moves the bid, `Ok(None)` leaves it untouched without error.
    pub fn next_status(
        &self,
        bid_id: Uuid,
        from: BidStatus,
    ) -> Result<Option<BidStatus>, ServiceError> {
        use BidStatus::*;

        let next = match (self, from) {
            (BidAction::Submit, Draft) => Some(Submitted),
            (BidAction::Withdraw, Draft | Submitted | Viewed) => Some(Withdrawn),
            (BidAction::Accept, Submitted | Viewed) => Some(Accepted),
            (BidAction::Reject, Submitted | Viewed | Accepted) => Some(Rejected),
            (BidAction::MarkViewed, Submitted) => Some(Viewed),
            (BidAction::MarkViewed, _) => return Ok(None),
            (BidAction::Start, Accepted) => Some(Started),
            _ => None,
        };

        next.map(Some).ok_or(ServiceError::InvalidBidTransition {
            bid_id,
            from,
            action: self.name(),
        })
    }

    pub fn authorize(&self, actor_id: Uuid, locked: &BidWithOwner) -> Result<(), ServiceError> {
        let allowed = match self.actor() {
            BidActor::Contractor => locked.bid.contractor_id == actor_id,
            BidActor::ProjectOwner => locked.project_owner_id == actor_id,
        };

        if allowed {
            Ok(())
        } else {
            Err(ServiceError::UnauthorizedBidAccess(actor_id, locked.bid.id))
        }
    }

    /// Authorization first, then the guard: a stranger learns nothing about the bid's state.
    pub fn apply(
        &self,
        actor_id: Uuid,
        locked: &BidWithOwner,
    ) -> Result<Option<BidStatus>, ServiceError> {
        self.authorize(actor_id, locked)?;
        self.next_status(locked.bid.id, locked.bid.status)
    }
}

/// Items and narrative fields may only change while the contractor still holds the draft.
pub fn ensure_editable(actor_id: Uuid, locked: &BidWithOwner) -> Result<(), ServiceError> {
    if locked.bid.contractor_id != actor_id {
        return Err(ServiceError::UnauthorizedBidAccess(actor_id, locked.bid.id));
    }
    if locked.bid.status != BidStatus::Draft {
        return Err(ServiceError::InvalidBidTransition {
            bid_id: locked.bid.id,
            from: locked.bid.status,
            action: "edit",
        });
    }
    Ok(())
}

/// Either party may look at or delete a bid; returns which party the caller is.
pub fn party_of(actor_id: Uuid, locked: &BidWithOwner) -> Result<BidActor, ServiceError> {
    if locked.bid.contractor_id == actor_id {
        Ok(BidActor::Contractor)
    } else if locked.project_owner_id == actor_id {
        Ok(BidActor::ProjectOwner)
    } else {
        Err(ServiceError::UnauthorizedBidAccess(actor_id, locked.bid.id))
    }
}
