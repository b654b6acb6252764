//! Database layer: migrations, the SQLite [`CampaignStore`], and cursor management.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gated_funding::{
    Campaign, CampaignId, CampaignStatus, CampaignStore, CampaignUpdate, Category, Checkpoint,
    CheckpointId, Contribution, ContributionId, ContributionSource, CreatorId, DonorId,
    NewContribution, Proof,
};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let url = if url.contains(":memory:") || url.contains("mode=rwc") {
        url
    } else if url.contains('?') {
        format!("{url}&mode=rwc")
    } else {
        format!("{url}?mode=rwc")
    };

    // Every in-memory connection is its own database, so keep exactly one.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Cursor helpers
// ─────────────────────────────────────────────────────────

/// Read the last-seen ledger from the cursor row.
/// Returns `0` when no cursor has been persisted yet.
pub async fn get_last_ledger(pool: &SqlitePool) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT last_ledger FROM indexer_cursor WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Persist the last-seen ledger (and optionally a pagination cursor string).
pub async fn save_cursor(
    pool: &SqlitePool,
    last_ledger: i64,
    last_cursor: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE indexer_cursor SET last_ledger = ?1, last_cursor = ?2 WHERE id = 1")
        .bind(last_ledger)
        .bind(last_cursor)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read back the raw cursor string (used to resume pagination mid-ledger).
pub async fn get_cursor_string(pool: &SqlitePool) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT last_cursor FROM indexer_cursor WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(v,)| v))
}

// ─────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    creator: String,
    title: String,
    description: String,
    story: String,
    category: String,
    goal: String,
    status: String,
    created_at: i64,
    ends_at: Option<i64>,
    next_checkpoint_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    checkpoint_id: i64,
    title: String,
    description: String,
    percentage: i64,
    completed: bool,
    proof_uri: Option<String>,
    proof_note: Option<String>,
    proof_submitted_at: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ContributionRow {
    id: i64,
    campaign_id: i64,
    donor: Option<String>,
    amount: String,
    timestamp: i64,
    source: String,
    tx_hash: Option<String>,
    ledger: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct UpdateRow {
    campaign_id: i64,
    title: String,
    content: String,
    posted_at: i64,
}

const CONTRIBUTION_COLUMNS: &str =
    "id, campaign_id, donor, amount, timestamp, source, tx_hash, ledger";

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| ServerError::CorruptRecord(format!("amount {raw:?}: {e}")))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ServerError::CorruptRecord(format!("timestamp {ms}")))
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint> {
        let percentage = u8::try_from(self.percentage)
            .map_err(|_| ServerError::CorruptRecord(format!("percentage {}", self.percentage)))?;
        let proof = match (self.proof_uri, self.proof_submitted_at) {
            (Some(uri), Some(at)) => Some(Proof {
                uri,
                note: self.proof_note,
                submitted_at: from_millis(at)?,
            }),
            _ => None,
        };
        Ok(Checkpoint {
            id: CheckpointId(self.checkpoint_id as u32),
            title: self.title,
            description: self.description,
            percentage,
            completed: self.completed,
            proof,
        })
    }
}

impl CampaignRow {
    fn into_campaign(self, checkpoints: Vec<Checkpoint>) -> Result<Campaign> {
        Ok(Campaign {
            id: CampaignId(self.id as u64),
            creator: CreatorId(self.creator),
            title: self.title,
            description: self.description,
            story: self.story,
            category: Category::parse(&self.category)
                .ok_or_else(|| ServerError::CorruptRecord(format!("category {}", self.category)))?,
            goal: parse_decimal(&self.goal)?,
            checkpoints,
            status: CampaignStatus::parse(&self.status)
                .ok_or_else(|| ServerError::CorruptRecord(format!("status {}", self.status)))?,
            created_at: from_millis(self.created_at)?,
            ends_at: self.ends_at.map(from_millis).transpose()?,
            next_checkpoint_id: self.next_checkpoint_id as u32,
        })
    }
}

impl ContributionRow {
    fn into_contribution(self) -> Result<Contribution> {
        let source = match (self.source.as_str(), self.tx_hash) {
            ("chain", Some(tx_hash)) => ContributionSource::Chain {
                tx_hash,
                ledger: self.ledger.unwrap_or(0) as u64,
            },
            ("direct", _) => ContributionSource::Direct,
            (other, _) => {
                return Err(ServerError::CorruptRecord(format!(
                    "contribution {} source {other}",
                    self.id
                )))
            }
        };
        Ok(Contribution {
            id: ContributionId(self.id as u64),
            campaign_id: CampaignId(self.campaign_id as u64),
            donor: self.donor.map(DonorId),
            amount: parse_decimal(&self.amount)?,
            timestamp: from_millis(self.timestamp)?,
            source,
        })
    }
}

impl UpdateRow {
    fn into_update(self) -> Result<CampaignUpdate> {
        Ok(CampaignUpdate {
            campaign_id: CampaignId(self.campaign_id as u64),
            title: self.title,
            content: self.content,
            posted_at: from_millis(self.posted_at)?,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────

/// [`CampaignStore`] over a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn checkpoints_for(&self, campaign_id: i64) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT checkpoint_id, title, description, percentage, completed,
                   proof_uri, proof_note, proof_submitted_at
            FROM   checkpoints
            WHERE  campaign_id = ?1
            ORDER  BY position ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }

    async fn hydrate(&self, rows: Vec<CampaignRow>) -> Result<Vec<Campaign>> {
        let mut campaigns = Vec::with_capacity(rows.len());
        for row in rows {
            let checkpoints = self.checkpoints_for(row.id).await?;
            campaigns.push(row.into_campaign(checkpoints)?);
        }
        Ok(campaigns)
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = campaign.id.0 as i64;

        sqlx::query(
            r#"
            INSERT INTO campaigns
                (id, creator, title, description, story, category, goal, status,
                 created_at, ends_at, next_checkpoint_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                creator            = excluded.creator,
                title              = excluded.title,
                description        = excluded.description,
                story              = excluded.story,
                category           = excluded.category,
                goal               = excluded.goal,
                status             = excluded.status,
                created_at         = excluded.created_at,
                ends_at            = excluded.ends_at,
                next_checkpoint_id = excluded.next_checkpoint_id
            "#,
        )
        .bind(id)
        .bind(&campaign.creator.0)
        .bind(&campaign.title)
        .bind(&campaign.description)
        .bind(&campaign.story)
        .bind(campaign.category.as_str())
        .bind(campaign.goal.to_string())
        .bind(campaign.status.as_str())
        .bind(campaign.created_at.timestamp_millis())
        .bind(campaign.ends_at.map(|t| t.timestamp_millis()))
        .bind(i64::from(campaign.next_checkpoint_id))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM checkpoints WHERE campaign_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, checkpoint) in campaign.checkpoints.iter().enumerate() {
            let proof = checkpoint.proof.as_ref();
            sqlx::query(
                r#"
                INSERT INTO checkpoints
                    (campaign_id, position, checkpoint_id, title, description, percentage,
                     completed, proof_uri, proof_note, proof_submitted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(id)
            .bind(position as i64)
            .bind(i64::from(checkpoint.id.0))
            .bind(&checkpoint.title)
            .bind(&checkpoint.description)
            .bind(i64::from(checkpoint.percentage))
            .bind(checkpoint.completed)
            .bind(proof.map(|p| p.uri.as_str()))
            .bind(proof.and_then(|p| p.note.as_deref()))
            .bind(proof.map(|p| p.submitted_at.timestamp_millis()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_contribution(&self, entry: NewContribution) -> Result<Option<Contribution>> {
        let (source, tx_hash, ledger) = match &entry.source {
            ContributionSource::Direct => ("direct", None, None),
            ContributionSource::Chain { tx_hash, ledger } => {
                ("chain", Some(tx_hash.as_str()), Some(*ledger as i64))
            }
        };

        // Chain entries are idempotent on tx_hash.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO contributions
                (campaign_id, donor, amount, timestamp, source, tx_hash, ledger)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(entry.campaign_id.0 as i64)
        .bind(entry.donor.as_ref().map(|d| d.0.as_str()))
        .bind(entry.amount.to_string())
        .bind(entry.timestamp.timestamp_millis())
        .bind(source)
        .bind(tx_hash)
        .bind(ledger)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        let id = ContributionId(result.last_insert_rowid() as u64);
        Ok(Some(entry.into_contribution(id)))
    }

    async fn select_contributions(&self, column: &str, value: SqlValue<'_>) -> Result<Vec<Contribution>> {
        let sql = format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE {column} = ?1 ORDER BY id ASC"
        );
        let query = sqlx::query_as::<_, ContributionRow>(&sql);
        let query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(ContributionRow::into_contribution)
            .collect()
    }
}

enum SqlValue<'a> {
    Int(i64),
    Text(&'a str),
}

const CAMPAIGN_COLUMNS: &str = "id, creator, title, description, story, category, goal, status, \
                                created_at, ends_at, next_checkpoint_id";

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn allocate_campaign_id(&self) -> gated_funding::Result<CampaignId> {
        let result = sqlx::query("INSERT INTO campaign_sequence DEFAULT VALUES")
            .execute(&self.pool)
            .await
            .map_err(ServerError::from)?;
        Ok(CampaignId(result.last_insert_rowid() as u64))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> gated_funding::Result<()> {
        Ok(self.insert_campaign(campaign).await?)
    }

    async fn load_campaign(&self, id: CampaignId) -> gated_funding::Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(ServerError::from)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_campaigns(&self) -> gated_funding::Result<Vec<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY id ASC");
        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(ServerError::from)?;
        Ok(self.hydrate(rows).await?)
    }

    async fn campaigns_by_creator(&self, creator: &CreatorId) -> gated_funding::Result<Vec<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE creator = ?1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(&creator.0)
            .fetch_all(&self.pool)
            .await
            .map_err(ServerError::from)?;
        Ok(self.hydrate(rows).await?)
    }

    async fn append_contribution(
        &self,
        entry: NewContribution,
    ) -> gated_funding::Result<Option<Contribution>> {
        Ok(self.insert_contribution(entry).await?)
    }

    async fn contributions(&self, campaign: CampaignId) -> gated_funding::Result<Vec<Contribution>> {
        Ok(self
            .select_contributions("campaign_id", SqlValue::Int(campaign.0 as i64))
            .await?)
    }

    async fn contributions_by_donor(
        &self,
        donor: &DonorId,
    ) -> gated_funding::Result<Vec<Contribution>> {
        Ok(self
            .select_contributions("donor", SqlValue::Text(&donor.0))
            .await?)
    }

    async fn append_update(&self, update: &CampaignUpdate) -> gated_funding::Result<()> {
        sqlx::query(
            "INSERT INTO campaign_updates (campaign_id, title, content, posted_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(update.campaign_id.0 as i64)
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.posted_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(ServerError::from)?;
        Ok(())
    }

    async fn updates(&self, campaign: CampaignId) -> gated_funding::Result<Vec<CampaignUpdate>> {
        let rows = sqlx::query_as::<_, UpdateRow>(
            r#"
            SELECT campaign_id, title, content, posted_at
            FROM   campaign_updates
            WHERE  campaign_id = ?1
            ORDER  BY id ASC
            "#,
        )
        .bind(campaign.0 as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ServerError::from)?;
        let updates: Result<Vec<CampaignUpdate>> =
            rows.into_iter().map(UpdateRow::into_update).collect();
        Ok(updates?)
    }
}
