//! Review session engine.
//!
//! One `ReviewEngine` exists per process and owns the single live
//! `ReviewSession`. The session sits behind an async mutex, so concurrent
//! HTTP requests are serialized on it: the service supports one reviewer at a
//! time and does not isolate several reviewers from each other.

use crate::annotations::{AnnotationStore, NamedLabel};
use crate::catalog::LabelCatalog;
use crate::config::ReviewConfig;
use crate::cursor::{Advance, ReviewCursor};
use crate::decisions::{Decision, DecisionPayload, ReviewStateMachine};
use crate::error::{Result, ReviewError};
use crate::fetcher::RowFetcher;
use crate::models::{CategoryFilter, Image, ImageStatus, Label};
use crate::presigned_urls::AssetUrlIssuer;
use crate::store::ReviewStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Identity of the image shown to the reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImageRef {
    Stored(i64),
    /// Shown once the session is exhausted
    Placeholder(String),
}

/// Composed view of the next image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub image_id: ImageRef,
    /// Signed image URL, the placeholder reference, or empty when exhausted
    pub image_data: String,
    /// Automatic labels, comma separated
    pub image_label: String,
    /// Manual labels with names
    pub labels: Vec<NamedLabel>,
    pub status: ImageStatus,
}

impl ImageView {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.image_id, ImageRef::Placeholder(_))
    }
}

/// Filters and progress of the live session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub start_date: DateTime<Utc>,
    pub category: String,
    pub offset: i64,
    pub exhausted: bool,
    /// Creation time of the most recently served image
    pub current_date: DateTime<Utc>,
}

/// The single reviewer session: cursor plus the last-seen image timestamp
struct ReviewSession {
    cursor: ReviewCursor,
    current_date: DateTime<Utc>,
}

pub struct ReviewEngine {
    store: Arc<dyn ReviewStore>,
    fetcher: RowFetcher,
    annotations: AnnotationStore,
    decisions: ReviewStateMachine,
    issuer: AssetUrlIssuer,
    config: ReviewConfig,
    session: Mutex<ReviewSession>,
}

impl ReviewEngine {
    /// Create the engine with an unfiltered session starting at the
    /// configured initial date
    pub fn new(store: Arc<dyn ReviewStore>, issuer: AssetUrlIssuer, config: ReviewConfig) -> Self {
        let fetcher = RowFetcher::new(store.clone());
        let start = config.initial_start();
        let cursor = ReviewCursor::new(fetcher.clone(), start, CategoryFilter::All, config.page_size);

        Self {
            annotations: AnnotationStore::new(store.clone()),
            decisions: ReviewStateMachine::new(store.clone()),
            store,
            fetcher,
            issuer,
            session: Mutex::new(ReviewSession {
                cursor,
                current_date: start,
            }),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    /// Start a new session from `start_date` filtered by `category`
    ///
    /// The previous cursor is discarded; the new one starts at offset 0. An
    /// unknown category fails before the session is touched.
    #[instrument(skip(self))]
    pub async fn configure_session(
        &self,
        start_date: DateTime<Utc>,
        category: &str,
    ) -> Result<SessionSnapshot> {
        let catalog = LabelCatalog::load(self.store.as_ref()).await?;
        let filter = catalog.resolve_category(category, &self.config.all_categories)?;

        let mut session = self.session.lock().await;
        session.cursor = ReviewCursor::new(
            self.fetcher.clone(),
            start_date,
            filter,
            self.config.page_size,
        );

        info!(
            start_date = %start_date,
            category = %category,
            "Review session configured"
        );
        metrics::counter!("review.sessions.configured").increment(1);

        Ok(self.snapshot_of(&session))
    }

    /// Serve the next image of the session
    ///
    /// Exhaustion yields the placeholder view. An image whose locator cannot
    /// be signed is served with the placeholder image reference instead of a
    /// URL. Datastore failures are returned as errors.
    pub async fn next_image(&self) -> Result<ImageView> {
        let image = {
            let mut session = self.session.lock().await;
            match session.cursor.try_advance().await? {
                Advance::Next(image) => {
                    session.current_date = image.created_time;
                    image
                }
                Advance::Exhausted => return Ok(self.exhausted_view()),
            }
        };

        let view = self.compose_view(image).await?;
        metrics::counter!("review.images.served").increment(1);
        Ok(view)
    }

    /// Validate and apply a reviewer decision
    ///
    /// Malformed payloads are rejected before the datastore is touched.
    pub async fn record_decision(&self, payload: DecisionPayload) -> Result<Decision> {
        let decision = Decision::try_from(payload)?;
        self.decisions.apply(&decision).await?;
        Ok(decision)
    }

    /// Labels directly under `parent`; `None` lists the root labels
    pub async fn list_labels(&self, parent: Option<i32>) -> Result<Vec<Label>> {
        let catalog = LabelCatalog::load(self.store.as_ref()).await?;
        Ok(catalog.children_of(parent))
    }

    /// Category names the reviewer can filter by, sentinel first
    pub async fn category_options(&self) -> Result<Vec<String>> {
        let catalog = LabelCatalog::load(self.store.as_ref()).await?;
        Ok(catalog.category_options(
            self.config.category_parent_id,
            &self.config.all_categories,
        ))
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock().await;
        self.snapshot_of(&session)
    }

    fn snapshot_of(&self, session: &ReviewSession) -> SessionSnapshot {
        let category = match session.cursor.category() {
            CategoryFilter::All => self.config.all_categories.clone(),
            CategoryFilter::Label { name, .. } => name.clone(),
        };

        SessionSnapshot {
            start_date: session.cursor.start_date(),
            category,
            offset: session.cursor.offset(),
            exhausted: session.cursor.is_exhausted(),
            current_date: session.current_date,
        }
    }

    #[instrument(skip(self, image), fields(image_id = image.id))]
    async fn compose_view(&self, image: Image) -> Result<ImageView> {
        let (catalog, annotations) = futures::try_join!(
            LabelCatalog::load(self.store.as_ref()),
            self.annotations.load(image.id),
        )?;

        let image_data = match self.issuer.issue(&image.locator).await {
            Ok(signed) => signed.url,
            Err(ReviewError::AssetResolutionFailed(reason)) => {
                warn!(
                    image_id = image.id,
                    locator = %image.locator,
                    reason = %reason,
                    "Serving placeholder for unresolvable image"
                );
                metrics::counter!("review.assets.unresolved").increment(1);
                self.config.placeholder_image.clone()
            }
            Err(e) => return Err(e),
        };

        Ok(ImageView {
            image_id: ImageRef::Stored(image.id),
            image_data,
            image_label: annotations.automatic_summary(&catalog),
            labels: annotations.manual_labels(&catalog),
            status: image.status,
        })
    }

    fn exhausted_view(&self) -> ImageView {
        ImageView {
            image_id: ImageRef::Placeholder(self.config.placeholder_image.clone()),
            image_data: String::new(),
            image_label: String::new(),
            labels: Vec::new(),
            status: ImageStatus::Todo,
        }
    }
}
