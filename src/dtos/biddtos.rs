use chrono::NaiveDate;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::bidmodel::{Bid, NewBidItem};

/// Largest magnitude a NUMERIC(14,2) price column holds, exclusive.
const PRICE_LIMIT: i64 = 1_000_000_000_000;

/// True when the value can be stored as a price without rounding or overflow.
pub fn fits_price_column(value: &BigDecimal) -> bool {
    value.with_scale(2) == *value && value.abs() < BigDecimal::from(PRICE_LIMIT)
}

pub fn validate_price(value: &BigDecimal) -> Result<(), ValidationError> {
    if value.is_negative() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("Price must not be negative".into());
        return Err(error);
    }
    if value.with_scale(2) != *value {
        let mut error = ValidationError::new("price_scale");
        error.message = Some("Price must have at most 2 decimal places".into());
        return Err(error);
    }
    if !fits_price_column(value) {
        let mut error = ValidationError::new("price_range");
        error.message = Some("Price must be below 1000000000000".into());
        return Err(error);
    }
    Ok(())
}

fn schedule_is_ordered(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            let mut error = ValidationError::new("schedule");
            error.message = Some("End date must not be before start date".into());
            Err(error)
        }
        _ => Ok(()),
    }
}

fn validate_create_schedule(dto: &CreateBidDto) -> Result<(), ValidationError> {
    schedule_is_ordered(dto.start_date, dto.end_date)
}

fn validate_patch_schedule(patch: &BidPatch) -> Result<(), ValidationError> {
    schedule_is_ordered(patch.start_date, patch.end_date)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BidItemDto {
    #[validate(length(min = 1, max = 200, message = "Item name must be between 1 and 200 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Item description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(custom = "validate_price")]
    pub price: BigDecimal,
}

impl From<BidItemDto> for NewBidItem {
    fn from(dto: BidItemDto) -> Self {
        NewBidItem {
            name: dto.name,
            description: dto.description,
            price: dto.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_create_schedule"))]
pub struct CreateBidDto {
    pub project_id: Uuid,

    /// Ignored when items are supplied; the total is then their sum.
    #[validate(custom = "validate_price")]
    pub total_price: Option<BigDecimal>,

    #[serde(default)]
    #[validate]
    pub items: Vec<BidItemDto>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[validate(length(max = 5000, message = "Notes must be at most 5000 characters"))]
    pub notes: Option<String>,

    #[validate(length(max = 5000, message = "Highlights must be at most 5000 characters"))]
    pub highlights: Option<String>,

    #[validate(length(max = 5000, message = "Experience must be at most 5000 characters"))]
    pub experience: Option<String>,

    #[validate(length(max = 5000, message = "Credentials must be at most 5000 characters"))]
    pub credentials: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplaceItemsDto {
    #[validate]
    pub items: Vec<BidItemDto>,
}

/// Partial update of a draft bid. Each field maps to one column; an all-empty patch is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_patch_schedule"))]
pub struct BidPatch {
    #[validate(custom = "validate_price")]
    pub total_price: Option<BigDecimal>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[validate(length(max = 5000, message = "Notes must be at most 5000 characters"))]
    pub notes: Option<String>,

    #[validate(length(max = 5000, message = "Highlights must be at most 5000 characters"))]
    pub highlights: Option<String>,

    #[validate(length(max = 5000, message = "Experience must be at most 5000 characters"))]
    pub experience: Option<String>,

    #[validate(length(max = 5000, message = "Credentials must be at most 5000 characters"))]
    pub credentials: Option<String>,
}

impl BidPatch {
    pub fn is_empty(&self) -> bool {
        self.total_price.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.notes.is_none()
            && self.highlights.is_none()
            && self.experience.is_none()
            && self.credentials.is_none()
    }

    /// Writes the patch onto an in-memory bid, mirroring the SQL update.
    pub fn apply_to(&self, bid: &mut Bid) {
        if let Some(total_price) = &self.total_price {
            bid.total_price = total_price.clone();
        }
        if let Some(start_date) = self.start_date {
            bid.start_date = Some(start_date);
        }
        if let Some(end_date) = self.end_date {
            bid.end_date = Some(end_date);
        }
        if let Some(notes) = &self.notes {
            bid.notes = Some(notes.clone());
        }
        if let Some(highlights) = &self.highlights {
            bid.highlights = Some(highlights.clone());
        }
        if let Some(experience) = &self.experience {
            bid.experience = Some(experience.clone());
        }
        if let Some(credentials) = &self.credentials {
            bid.credentials = Some(credentials.clone());
        }
    }
}
