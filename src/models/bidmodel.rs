use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Draft,
    Submitted,
    Viewed,
    Accepted,
    Rejected,
    Withdrawn,
    Started,
}

impl BidStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            BidStatus::Draft => "draft",
            BidStatus::Submitted => "submitted",
            BidStatus::Viewed => "viewed",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
            BidStatus::Withdrawn => "withdrawn",
            BidStatus::Started => "started",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BidStatus::Rejected | BidStatus::Withdrawn | BidStatus::Started
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "contractor_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractorType {
    GeneralContractor,
    Subcontractor,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Open,
    Active,
    Completed,
    Cancelled,
}

/// The slice of a project the bid engine and chat need: who owns it and what it's called.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectRef {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub project_id: Uuid,
    pub contractor_id: Uuid,
    pub contractor_type: ContractorType,
    pub total_price: BigDecimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub highlights: Option<String>,
    pub experience: Option<String>,
    pub credentials: Option<String>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BidItem {
    pub id: Uuid,
    pub bid_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// Append-only history row. One per status change.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BidStatusLog {
    pub id: i64,
    pub bid_id: Uuid,
    pub old_status: Option<BidStatus>,
    pub new_status: BidStatus,
    pub changed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A bid row read together with the owner of its project, as locked inside a transition.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BidWithOwner {
    #[sqlx(flatten)]
    pub bid: Bid,
    pub project_owner_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidDetail {
    pub bid: Bid,
    pub items: Vec<BidItem>,
    pub history: Vec<BidStatusLog>,
}

/// Result of a state transition. `previous` is `None` when the guard skipped the change.
#[derive(Debug, Clone)]
pub struct BidTransition {
    pub bid: Bid,
    pub project_owner_id: Uuid,
    pub previous: Option<BidStatus>,
}

impl BidTransition {
    pub fn changed(&self) -> bool {
        self.previous.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemsReplaced {
    pub count: usize,
    pub total_calculated: BigDecimal,
}

/// Line item as supplied by the contractor, before it has an id.
#[derive(Debug, Clone)]
pub struct NewBidItem {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
}

/// Everything needed to insert a draft bid.
#[derive(Debug, Clone)]
pub struct NewBid {
    pub project_id: Uuid,
    pub contractor_id: Uuid,
    pub contractor_type: ContractorType,
    pub total_price: BigDecimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub highlights: Option<String>,
    pub experience: Option<String>,
    pub credentials: Option<String>,
    pub items: Vec<NewBidItem>,
}

pub fn sum_item_prices(items: &[NewBidItem]) -> BigDecimal {
    items
        .iter()
        .fold(BigDecimal::from(0), |acc, item| acc + &item.price)
}
