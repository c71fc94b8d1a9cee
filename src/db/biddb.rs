// db/biddb.rs
use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder, types::BigDecimal};
use uuid::Uuid;

use super::{db::DBClient, projectdb::ProjectExt};
use crate::{
    dtos::biddtos::BidPatch,
    models::bidmodel::*,
    service::{
        bid_rules::{self, BidAction},
        error::ServiceError,
    },
};

const BID_COLUMNS: &str = "b.id, b.project_id, b.contractor_id, b.contractor_type, b.total_price, \
     b.start_date, b.end_date, b.notes, b.highlights, b.experience, b.credentials, \
     b.status, b.created_at, b.updated_at";

const BID_RETURNING: &str = "id, project_id, contractor_id, contractor_type, total_price, \
     start_date, end_date, notes, highlights, experience, credentials, \
     status, created_at, updated_at";

#[async_trait]
pub trait BidExt: ProjectExt + Send + Sync {
    async fn create_bid(&self, new_bid: NewBid) -> Result<(Bid, Vec<BidItem>), ServiceError>;

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<BidWithOwner>, sqlx::Error>;

    async fn get_bid_items(&self, bid_id: Uuid) -> Result<Vec<BidItem>, sqlx::Error>;

    async fn get_bid_history(&self, bid_id: Uuid) -> Result<Vec<BidStatusLog>, sqlx::Error>;

    async fn get_project_bids(&self, project_id: Uuid) -> Result<Vec<Bid>, sqlx::Error>;

    async fn get_contractor_bids(&self, contractor_id: Uuid) -> Result<Vec<Bid>, sqlx::Error>;

    /// Locks the bid, checks the caller and the guard, writes status + log in one transaction.
    async fn transition_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        action: BidAction,
    ) -> Result<BidTransition, ServiceError>;

    async fn replace_bid_items(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        items: Vec<NewBidItem>,
    ) -> Result<ItemsReplaced, ServiceError>;

    async fn update_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        patch: BidPatch,
    ) -> Result<Bid, ServiceError>;

    async fn delete_bid(&self, bid_id: Uuid, actor_id: Uuid) -> Result<BidWithOwner, ServiceError>;
}

async fn lock_bid(conn: &mut PgConnection, bid_id: Uuid) -> Result<BidWithOwner, ServiceError> {
    let sql = format!(
        r#"
        SELECT {}, p.owner_id AS project_owner_id
        FROM bids b
        JOIN projects p ON p.id = b.project_id
        WHERE b.id = $1
        FOR UPDATE OF b
        "#,
        BID_COLUMNS
    );

    sqlx::query_as::<_, BidWithOwner>(&sql)
        .bind(bid_id)
        .fetch_optional(conn)
        .await?
        .ok_or(ServiceError::BidNotFound(bid_id))
}

async fn append_status_log(
    conn: &mut PgConnection,
    bid_id: Uuid,
    old_status: Option<BidStatus>,
    new_status: BidStatus,
    changed_by: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO bid_status_log (bid_id, old_status, new_status, changed_by)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(bid_id)
    .bind(old_status)
    .bind(new_status)
    .bind(changed_by)
    .execute(conn)
    .await?;

    Ok(())
}

async fn insert_items(
    conn: &mut PgConnection,
    bid_id: Uuid,
    items: &[NewBidItem],
) -> Result<Vec<BidItem>, sqlx::Error> {
    let mut inserted = Vec::with_capacity(items.len());
    for item in items {
        let row = sqlx::query_as::<_, BidItem>(
            r#"
            INSERT INTO bid_items (bid_id, name, description, price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, bid_id, name, description, price, created_at
            "#,
        )
        .bind(bid_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.price)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

/// Builds `UPDATE bids SET ... WHERE id = $n RETURNING ...` from the fields present in the patch.
pub fn build_patch_query(bid_id: Uuid, patch: &BidPatch) -> Result<QueryBuilder<'_, Postgres>, ServiceError> {
    if patch.is_empty() {
        return Err(ServiceError::Validation("No fields to update".to_string()));
    }

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE bids SET ");
    let mut set = builder.separated(", ");

    if let Some(total_price) = &patch.total_price {
        set.push("total_price = ").push_bind_unseparated(total_price);
    }
    if let Some(start_date) = patch.start_date {
        set.push("start_date = ").push_bind_unseparated(start_date);
    }
    if let Some(end_date) = patch.end_date {
        set.push("end_date = ").push_bind_unseparated(end_date);
    }
    if let Some(notes) = &patch.notes {
        set.push("notes = ").push_bind_unseparated(notes);
    }
    if let Some(highlights) = &patch.highlights {
        set.push("highlights = ").push_bind_unseparated(highlights);
    }
    if let Some(experience) = &patch.experience {
        set.push("experience = ").push_bind_unseparated(experience);
    }
    if let Some(credentials) = &patch.credentials {
        set.push("credentials = ").push_bind_unseparated(credentials);
    }
    set.push("updated_at = NOW()");

    builder.push(" WHERE id = ").push_bind(bid_id);
    builder.push(" RETURNING ").push(BID_RETURNING);

    Ok(builder)
}

#[async_trait]
impl BidExt for DBClient {
    async fn create_bid(&self, new_bid: NewBid) -> Result<(Bid, Vec<BidItem>), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM bids
            WHERE project_id = $1 AND contractor_id = $2
            FOR UPDATE
            "#,
        )
        .bind(new_bid.project_id)
        .bind(new_bid.contractor_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(ServiceError::DuplicateBid {
                project_id: new_bid.project_id,
                contractor_id: new_bid.contractor_id,
            });
        }

        let inserted = sqlx::query_as::<_, Bid>(&format!(
            r#"
            INSERT INTO bids
            (project_id, contractor_id, contractor_type, total_price, start_date, end_date,
             notes, highlights, experience, credentials, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'draft'::bid_status)
            RETURNING {}
            "#,
            BID_RETURNING
        ))
        .bind(new_bid.project_id)
        .bind(new_bid.contractor_id)
        .bind(new_bid.contractor_type)
        .bind(&new_bid.total_price)
        .bind(new_bid.start_date)
        .bind(new_bid.end_date)
        .bind(&new_bid.notes)
        .bind(&new_bid.highlights)
        .bind(&new_bid.experience)
        .bind(&new_bid.credentials)
        .fetch_one(&mut *tx)
        .await
        .map_err(ServiceError::from);

        // A concurrent create can slip past the check above; the unique key catches it.
        let bid = match inserted {
            Ok(bid) => bid,
            Err(e) if e.is_unique_violation() => {
                return Err(ServiceError::DuplicateBid {
                    project_id: new_bid.project_id,
                    contractor_id: new_bid.contractor_id,
                })
            }
            Err(e) => return Err(e),
        };

        let items = insert_items(&mut tx, bid.id, &new_bid.items).await?;
        append_status_log(&mut tx, bid.id, None, BidStatus::Draft, new_bid.contractor_id).await?;

        tx.commit().await?;
        Ok((bid, items))
    }

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<BidWithOwner>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}, p.owner_id AS project_owner_id
            FROM bids b
            JOIN projects p ON p.id = b.project_id
            WHERE b.id = $1
            "#,
            BID_COLUMNS
        );

        sqlx::query_as::<_, BidWithOwner>(&sql)
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_bid_items(&self, bid_id: Uuid) -> Result<Vec<BidItem>, sqlx::Error> {
        sqlx::query_as::<_, BidItem>(
            r#"
            SELECT id, bid_id, name, description, price, created_at
            FROM bid_items
            WHERE bid_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(bid_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_bid_history(&self, bid_id: Uuid) -> Result<Vec<BidStatusLog>, sqlx::Error> {
        sqlx::query_as::<_, BidStatusLog>(
            r#"
            SELECT id, bid_id, old_status, new_status, changed_by, created_at
            FROM bid_status_log
            WHERE bid_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(bid_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_project_bids(&self, project_id: Uuid) -> Result<Vec<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(&format!(
            r#"
            SELECT {}
            FROM bids b
            WHERE b.project_id = $1 AND b.status <> 'draft'::bid_status
            ORDER BY b.created_at DESC
            "#,
            BID_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_contractor_bids(&self, contractor_id: Uuid) -> Result<Vec<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(&format!(
            r#"
            SELECT {}
            FROM bids b
            WHERE b.contractor_id = $1
            ORDER BY b.created_at DESC
            "#,
            BID_COLUMNS
        ))
        .bind(contractor_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn transition_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        action: BidAction,
    ) -> Result<BidTransition, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let locked = lock_bid(&mut tx, bid_id).await?;
        let next = action.apply(actor_id, &locked)?;

        let Some(next) = next else {
            tx.commit().await?;
            return Ok(BidTransition {
                bid: locked.bid,
                project_owner_id: locked.project_owner_id,
                previous: None,
            });
        };

        let bid = sqlx::query_as::<_, Bid>(&format!(
            r#"
            UPDATE bids
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BID_RETURNING
        ))
        .bind(bid_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        append_status_log(&mut tx, bid_id, Some(locked.bid.status), next, actor_id).await?;

        if action == BidAction::Start {
            sqlx::query(
                r#"
                UPDATE projects
                SET status = 'active'::project_status, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(bid.project_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(BidTransition {
            bid,
            project_owner_id: locked.project_owner_id,
            previous: Some(locked.bid.status),
        })
    }

    async fn replace_bid_items(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        items: Vec<NewBidItem>,
    ) -> Result<ItemsReplaced, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let locked = lock_bid(&mut tx, bid_id).await?;
        bid_rules::ensure_editable(actor_id, &locked)?;

        sqlx::query("DELETE FROM bid_items WHERE bid_id = $1")
            .bind(bid_id)
            .execute(&mut *tx)
            .await?;

        let inserted = insert_items(&mut tx, bid_id, &items).await?;
        let total: BigDecimal = sum_item_prices(&items);

        sqlx::query(
            r#"
            UPDATE bids
            SET total_price = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(bid_id)
        .bind(&total)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ItemsReplaced {
            count: inserted.len(),
            total_calculated: total,
        })
    }

    async fn update_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        patch: BidPatch,
    ) -> Result<Bid, ServiceError> {
        let mut builder = build_patch_query(bid_id, &patch)?;
        let mut tx = self.pool.begin().await?;

        let locked = lock_bid(&mut tx, bid_id).await?;
        bid_rules::ensure_editable(actor_id, &locked)?;

        let bid = builder
            .build_query_as::<Bid>()
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(bid)
    }

    async fn delete_bid(&self, bid_id: Uuid, actor_id: Uuid) -> Result<BidWithOwner, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let locked = lock_bid(&mut tx, bid_id).await?;
        bid_rules::party_of(actor_id, &locked)?;

        sqlx::query("DELETE FROM bids WHERE id = $1")
            .bind(bid_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(locked)
    }
}
