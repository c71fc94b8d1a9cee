// service/bid_service.rs
use std::sync::Arc;

use sqlx::types::BigDecimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::biddb::BidExt,
    dtos::biddtos::{fits_price_column, BidItemDto, BidPatch, CreateBidDto},
    models::{bidmodel::*, usermodel::User},
    realtime::{
        events::{user_room, ServerEvent},
        hub::EventBroadcaster,
    },
    service::{
        bid_rules::{self, BidAction, BidActor},
        error::ServiceError,
    },
};

#[derive(Clone)]
pub struct BidService {
    store: Arc<dyn BidExt>,
    events: Arc<dyn EventBroadcaster>,
}

impl BidService {
    pub fn new(store: Arc<dyn BidExt>, events: Arc<dyn EventBroadcaster>) -> Self {
        Self { store, events }
    }

    pub async fn create_bid(
        &self,
        contractor: &User,
        body: CreateBidDto,
    ) -> Result<(Bid, Vec<BidItem>), ServiceError> {
        let contractor_type = contractor.role.contractor_type().ok_or_else(|| {
            ServiceError::Forbidden(format!(
                "Users with the {} role cannot place bids",
                contractor.role.to_str()
            ))
        })?;

        let project = self
            .store
            .get_project(body.project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(body.project_id))?;

        if project.owner_id == contractor.id {
            return Err(ServiceError::Forbidden(
                "You cannot bid on your own project".to_string(),
            ));
        }

        let items: Vec<NewBidItem> = body.items.into_iter().map(NewBidItem::from).collect();
        let total_price = if items.is_empty() {
            body.total_price.ok_or_else(|| {
                ServiceError::Validation("total_price is required when no items are given".to_string())
            })?
        } else {
            sum_item_prices(&items)
        };
        ensure_total_fits(&total_price)?;

        let (bid, items) = self
            .store
            .create_bid(NewBid {
                project_id: project.id,
                contractor_id: contractor.id,
                contractor_type,
                total_price,
                start_date: body.start_date,
                end_date: body.end_date,
                notes: body.notes,
                highlights: body.highlights,
                experience: body.experience,
                credentials: body.credentials,
                items,
            })
            .await?;

        info!(
            "Bid {} created on project {} by {} ({} items)",
            bid.id,
            project.id,
            contractor.id,
            items.len()
        );
        Ok((bid, items))
    }

    pub async fn update_bid(
        &self,
        contractor_id: Uuid,
        bid_id: Uuid,
        patch: BidPatch,
    ) -> Result<Bid, ServiceError> {
        self.store.update_bid(bid_id, contractor_id, patch).await
    }

    pub async fn replace_items(
        &self,
        contractor_id: Uuid,
        bid_id: Uuid,
        items: Vec<BidItemDto>,
    ) -> Result<ItemsReplaced, ServiceError> {
        let items: Vec<NewBidItem> = items.into_iter().map(NewBidItem::from).collect();
        ensure_total_fits(&sum_item_prices(&items))?;
        let replaced = self.store.replace_bid_items(bid_id, contractor_id, items).await?;

        info!(
            "Bid {} items replaced: {} items, total {}",
            bid_id, replaced.count, replaced.total_calculated
        );
        Ok(replaced)
    }

    pub async fn submit(&self, contractor_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, contractor_id, BidAction::Submit).await
    }

    pub async fn withdraw(&self, contractor_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, contractor_id, BidAction::Withdraw).await
    }

    pub async fn accept(&self, owner_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, owner_id, BidAction::Accept).await
    }

    pub async fn reject(&self, owner_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, owner_id, BidAction::Reject).await
    }

    /// Moves an accepted bid to `started` and activates its project.
    pub async fn start_project(&self, owner_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, owner_id, BidAction::Start).await
    }

    pub async fn mark_viewed(&self, owner_id: Uuid, bid_id: Uuid) -> Result<Bid, ServiceError> {
        self.transition(bid_id, owner_id, BidAction::MarkViewed).await
    }

    /// Either party may read a bid. The project owner reading it marks it viewed.
    pub async fn get_detail(&self, user_id: Uuid, bid_id: Uuid) -> Result<BidDetail, ServiceError> {
        let current = self
            .store
            .get_bid(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        let bid = match bid_rules::party_of(user_id, &current)? {
            BidActor::ProjectOwner => self.mark_viewed(user_id, bid_id).await?,
            BidActor::Contractor => current.bid,
        };

        let items = self.store.get_bid_items(bid_id).await?;
        let history = self.store.get_bid_history(bid_id).await?;

        Ok(BidDetail { bid, items, history })
    }

    pub async fn list_project_bids(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Bid>, ServiceError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(project_id))?;

        if project.owner_id != owner_id {
            return Err(ServiceError::UnauthorizedProjectAccess(owner_id, project_id));
        }

        Ok(self.store.get_project_bids(project_id).await?)
    }

    pub async fn list_my_bids(&self, contractor_id: Uuid) -> Result<Vec<Bid>, ServiceError> {
        Ok(self.store.get_contractor_bids(contractor_id).await?)
    }

    pub async fn delete_bid(&self, user_id: Uuid, bid_id: Uuid) -> Result<(), ServiceError> {
        let deleted = self.store.delete_bid(bid_id, user_id).await?;
        info!(
            "Bid {} on project {} deleted by {}",
            bid_id, deleted.bid.project_id, user_id
        );
        Ok(())
    }

    async fn transition(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        action: BidAction,
    ) -> Result<Bid, ServiceError> {
        let transition = match self.store.transition_bid(bid_id, actor_id, action).await {
            Ok(transition) => transition,
            Err(e) => {
                if matches!(e, ServiceError::InvalidBidTransition { .. }) {
                    warn!("Rejected {} on bid {} by {}: {}", action.name(), bid_id, actor_id, e);
                }
                return Err(e);
            }
        };

        if transition.changed() {
            info!(
                "Bid {} moved {} -> {} by {}",
                bid_id,
                transition.previous.map(|s| s.to_str()).unwrap_or("none"),
                transition.bid.status.to_str(),
                actor_id
            );
            if transition.bid.status.is_terminal() {
                info!("Bid {} is closed", bid_id);
            }
            self.notify(&transition).await;
        }

        Ok(transition.bid)
    }

    async fn notify(&self, transition: &BidTransition) {
        let event = ServerEvent::BidUpdated {
            bid_id: transition.bid.id,
            project_id: transition.bid.project_id,
            status: transition.bid.status,
            previous_status: transition.previous,
        };

        self.events
            .to_room(&user_room(transition.bid.contractor_id), event.clone())
            .await;
        self.events
            .to_room(&user_room(transition.project_owner_id), event)
            .await;
    }
}

fn ensure_total_fits(total: &BigDecimal) -> Result<(), ServiceError> {
    if fits_price_column(total) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "Bid total {} exceeds the largest supported price",
            total
        )))
    }
}
