// db/projectdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::bidmodel::ProjectRef;

#[async_trait]
pub trait ProjectExt {
    async fn get_project(&self, project_id: Uuid) -> Result<Option<ProjectRef>, sqlx::Error>;
}

#[async_trait]
impl ProjectExt for DBClient {
    async fn get_project(&self, project_id: Uuid) -> Result<Option<ProjectRef>, sqlx::Error> {
        sqlx::query_as::<_, ProjectRef>(
            r#"
            SELECT id, owner_id, name, status
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Row seeding for tests that run against a migrated database.
#[cfg(test)]
pub mod seed {
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::models::{bidmodel::ProjectRef, usermodel::UserRole};

    pub async fn user(pool: &PgPool, name: &str, role: UserRole) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (name, email, role)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(format!("{}@example.com", Uuid::new_v4().simple()))
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn project(pool: &PgPool, owner_id: Uuid, name: &str) -> ProjectRef {
        sqlx::query_as::<_, ProjectRef>(
            r#"
            INSERT INTO projects (owner_id, name)
            VALUES ($1, $2)
            RETURNING id, owner_id, name, status
            "#,
        )
        .bind(owner_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }
}
