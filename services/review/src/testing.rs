//! In-memory `ReviewStore` for unit tests.

use crate::error::{Result, ReviewError};
use crate::fetcher::PageRequest;
use crate::models::{CategoryFilter, Image, ImageStatus, Label, LabelValue, Provenance};
use crate::store::ReviewStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AnnotationRow {
    image_id: i64,
    label_id: i32,
    value: bool,
    provenance: Provenance,
}

#[derive(Default)]
struct State {
    images: BTreeMap<i64, Image>,
    labels: Vec<Label>,
    annotations: Vec<AnnotationRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    page_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images `1..=count`, image `n` created at midnight on 2024-01-n
    pub fn with_daily_images(count: i64) -> Self {
        let store = Self::new();
        for id in 1..=count {
            store.add_image(id, date(2024, 1, 1) + Duration::days(id - 1));
        }
        store
    }

    pub fn add_image(&self, id: i64, created_time: DateTime<Utc>) {
        let image = Image {
            id,
            name: format!("img-{id}.jpg"),
            locator: format!("s3://review-images/img-{id}.jpg"),
            created_time,
            status: ImageStatus::Todo,
        };
        self.state.lock().unwrap().images.insert(id, image);
    }

    pub fn set_locator(&self, id: i64, locator: &str) {
        if let Some(image) = self.state.lock().unwrap().images.get_mut(&id) {
            image.locator = locator.to_string();
        }
    }

    pub fn add_label(&self, id: i32, name: &str, parent: Option<i32>) {
        self.state.lock().unwrap().labels.push(Label {
            id,
            name: name.to_string(),
            parent,
        });
    }

    pub fn annotate(&self, image_id: i64, label_id: i32, value: bool, provenance: Provenance) {
        self.state.lock().unwrap().annotations.push(AnnotationRow {
            image_id,
            label_id,
            value,
            provenance,
        });
    }

    pub fn status_of(&self, image_id: i64) -> Option<ImageStatus> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(&image_id)
            .map(|i| i.status)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ReviewError::DatastoreUnavailable(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn fetch_images(&self, page: &PageRequest) -> Result<Vec<Image>> {
        self.check_available()?;
        self.page_fetches.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        let eligible = |image: &Image| match page.category {
            CategoryFilter::All => true,
            CategoryFilter::Label { label_id, .. } => state.annotations.iter().any(|a| {
                a.image_id == image.id
                    && a.label_id == label_id
                    && a.value
                    && a.provenance == Provenance::Manual
            }),
        };

        Ok(state
            .images
            .values()
            .filter(|i| i.created_time > page.start_date)
            .filter(|&i| eligible(i))
            .skip(page.offset as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect())
    }

    async fn fetch_labels(&self) -> Result<Vec<Label>> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn fetch_annotations(
        &self,
        image_id: i64,
        provenance: Provenance,
    ) -> Result<Vec<LabelValue>> {
        self.check_available()?;

        let state = self.state.lock().unwrap();
        let mut values: Vec<LabelValue> = state
            .annotations
            .iter()
            .filter(|a| a.image_id == image_id && a.provenance == provenance)
            .map(|a| LabelValue::new(a.label_id, a.value))
            .collect();
        values.sort_by_key(|v| v.label_id);
        Ok(values)
    }

    async fn replace_manual_annotations(&self, image_id: i64, labels: &[LabelValue]) -> Result<()> {
        self.check_available()?;

        let mut state = self.state.lock().unwrap();
        state
            .annotations
            .retain(|a| !(a.image_id == image_id && a.provenance == Provenance::Manual));
        for label in labels {
            state.annotations.push(AnnotationRow {
                image_id,
                label_id: label.label_id,
                value: label.value,
                provenance: Provenance::Manual,
            });
        }
        Ok(())
    }

    async fn update_image_status(&self, image_id: i64, status: ImageStatus) -> Result<()> {
        self.check_available()?;

        if let Some(image) = self.state.lock().unwrap().images.get_mut(&image_id) {
            image.status = status;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
