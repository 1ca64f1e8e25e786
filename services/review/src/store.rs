use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::fetcher::PageRequest;
use crate::models::{CategoryFilter, Image, ImageRecord, ImageStatus, Label, LabelValue, Provenance};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument, warn};

/// Datastore operations the review engine depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Fetch one page of images, ordered by id
    async fn fetch_images(&self, page: &PageRequest) -> Result<Vec<Image>>;

    /// Fetch every known label
    async fn fetch_labels(&self) -> Result<Vec<Label>>;

    /// Fetch the annotations of one provenance for an image, ordered by label id
    async fn fetch_annotations(&self, image_id: i64, provenance: Provenance)
        -> Result<Vec<LabelValue>>;

    /// Replace all manual annotations of an image in a single transaction
    async fn replace_manual_annotations(&self, image_id: i64, labels: &[LabelValue]) -> Result<()>;

    /// Set the review status of an image
    async fn update_image_status(&self, image_id: i64, status: ImageStatus) -> Result<()>;

    /// Check datastore connectivity
    async fn ping(&self) -> Result<()>;
}

/// PostgreSQL-backed review store
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    /// Create a new store with a bounded connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_size)
            .max_connections(config.max_connections())
            .acquire_timeout(config.acquire_timeout())
            .max_lifetime(Some(config.recycle_after()))
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(
            pool_size = config.pool_size,
            max_connections = config.max_connections(),
            "Connected to PostgreSQL database"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    #[instrument(skip(self), fields(offset = page.offset, page_size = page.page_size))]
    async fn fetch_images(&self, page: &PageRequest) -> Result<Vec<Image>> {
        let records = match &page.category {
            CategoryFilter::All => {
                sqlx::query_as::<_, ImageRecord>(
                    r#"
                    SELECT id, name, url, created_time, annotation_status_id
                    FROM images
                    WHERE created_time > $1
                    ORDER BY id
                    OFFSET $2 LIMIT $3
                    "#,
                )
                .bind(page.start_date)
                .bind(page.offset)
                .bind(page.page_size)
                .fetch_all(&self.pool)
                .await?
            }
            CategoryFilter::Label { label_id, .. } => {
                sqlx::query_as::<_, ImageRecord>(
                    r#"
                    SELECT id, name, url, created_time, annotation_status_id
                    FROM images
                    WHERE created_time > $1
                      AND id IN (
                          SELECT image_id FROM annotations
                          WHERE label_id = $2
                            AND value = TRUE
                            AND auto_label = FALSE
                      )
                    ORDER BY id
                    OFFSET $3 LIMIT $4
                    "#,
                )
                .bind(page.start_date)
                .bind(*label_id)
                .bind(page.offset)
                .bind(page.page_size)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(records.into_iter().map(Image::from).collect())
    }

    async fn fetch_labels(&self) -> Result<Vec<Label>> {
        let labels = sqlx::query_as::<_, Label>(
            r#"
            SELECT id, name, parent
            FROM labels
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(labels)
    }

    async fn fetch_annotations(
        &self,
        image_id: i64,
        provenance: Provenance,
    ) -> Result<Vec<LabelValue>> {
        let annotations = sqlx::query_as::<_, LabelValue>(
            r#"
            SELECT label_id, value
            FROM annotations
            WHERE image_id = $1 AND auto_label = $2
            ORDER BY label_id
            "#,
        )
        .bind(image_id)
        .bind(provenance.is_automatic())
        .fetch_all(&self.pool)
        .await?;

        Ok(annotations)
    }

    #[instrument(skip(self, labels), fields(label_count = labels.len()))]
    async fn replace_manual_annotations(&self, image_id: i64, labels: &[LabelValue]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM annotations
            WHERE image_id = $1 AND auto_label = FALSE
            "#,
        )
        .bind(image_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        for label in labels {
            sqlx::query(
                r#"
                INSERT INTO annotations (image_id, label_id, value, auto_label)
                VALUES ($1, $2, $3, FALSE)
                "#,
            )
            .bind(image_id)
            .bind(label.label_id)
            .bind(label.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            image_id = image_id,
            deleted = deleted,
            inserted = labels.len(),
            "Manual annotations replaced"
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_image_status(&self, image_id: i64, status: ImageStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE images
            SET annotation_status_id = $1
            WHERE id = $2
            "#,
        )
        .bind(i32::from(status))
        .bind(image_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(image_id = image_id, "Status update matched no image");
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
