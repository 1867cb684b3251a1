use anyhow::Result;
use serenity::async_trait;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

use crate::automod::platform::{InfractionStore, NewInfraction};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max: Option<u32>) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max.unwrap_or(10))
        .connect(url)
        .await?;

    Ok(pool)
}

/// Tworzy schemat i tabelę naruszeń (idempotentnie, przy każdym starcie).
pub async fn ensure_tables(db: &Db) -> Result<()> {
    sqlx::query(r#"CREATE SCHEMA IF NOT EXISTS morrible;"#)
        .execute(db)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS morrible.infractions (
          id               BIGSERIAL   PRIMARY KEY,
          guild_id         BIGINT      NOT NULL,
          user_id          BIGINT      NOT NULL,
          moderator_id     BIGINT      NOT NULL,
          infraction_type  VARCHAR(20) NOT NULL,
          reason           VARCHAR(500) NOT NULL,
          duration_seconds INTEGER     NULL,
          created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_infractions_user
          ON morrible.infractions (user_id);
        "#,
    )
    .execute(db)
    .await?;

    Ok(())
}

/// Rejestr naruszeń w Postgresie: tylko INSERT i COUNT.
#[derive(Clone)]
pub struct PgInfractionStore {
    db: Db,
}

impl PgInfractionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InfractionStore for PgInfractionStore {
    async fn append(&self, infraction: NewInfraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO morrible.infractions
              (guild_id, user_id, moderator_id, infraction_type, reason, duration_seconds)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(infraction.guild_id as i64)
        .bind(infraction.user_id as i64)
        .bind(infraction.moderator_id as i64)
        .bind(infraction.kind.as_str())
        .bind(&infraction.reason)
        .bind(infraction.duration_seconds)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn count(&self, user_id: u64) -> Result<i64> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM morrible.infractions WHERE user_id = $1")
                .bind(user_id as i64)
                .fetch_one(&self.db)
                .await?;
        Ok(n)
    }
}
