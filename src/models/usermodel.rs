use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::bidmodel::ContractorType;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Homeowner,
    GeneralContractor,
    Subcontractor,
    Supplier,
    Admin,
}

impl UserRole {
    pub fn to_str(&self) -> &'static str {
        match self {
            UserRole::Homeowner => "homeowner",
            UserRole::GeneralContractor => "general_contractor",
            UserRole::Subcontractor => "subcontractor",
            UserRole::Supplier => "supplier",
            UserRole::Admin => "admin",
        }
    }

    /// The kind of bidder this role acts as, if it may bid at all.
    pub fn contractor_type(&self) -> Option<ContractorType> {
        match self {
            UserRole::GeneralContractor => Some(ContractorType::GeneralContractor),
            UserRole::Subcontractor => Some(ContractorType::Subcontractor),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}
