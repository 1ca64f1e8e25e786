use crate::catalog::LabelCatalog;
use crate::error::Result;
use crate::models::{LabelValue, Provenance};
use crate::store::ReviewStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shown in place of automatic labels when the labeler found nothing
pub const NO_AUTOMATIC_LABEL: &str = "???";

/// A manual label value with its display name, as sent to the reviewer client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedLabel {
    pub id: i32,
    pub value: bool,
    pub name: String,
}

/// Manual and automatic annotations of one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAnnotations {
    pub manual: Vec<LabelValue>,
    pub automatic: Vec<LabelValue>,
}

impl ImageAnnotations {
    /// Manual annotations with label names resolved through the catalog
    pub fn manual_labels(&self, catalog: &LabelCatalog) -> Vec<NamedLabel> {
        self.manual
            .iter()
            .map(|a| NamedLabel {
                id: a.label_id,
                value: a.value,
                name: catalog.name_of(a.label_id).unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Comma-separated names of the true automatic labels, in catalog order
    pub fn automatic_summary(&self, catalog: &LabelCatalog) -> String {
        let names: Vec<&str> = catalog
            .labels()
            .iter()
            .filter(|l| {
                self.automatic
                    .iter()
                    .any(|a| a.value && a.label_id == l.id)
            })
            .map(|l| l.name.as_str())
            .collect();

        if names.is_empty() {
            NO_AUTOMATIC_LABEL.to_string()
        } else {
            names.join(",")
        }
    }
}

/// Reads and writes per-image label values
#[derive(Clone)]
pub struct AnnotationStore {
    store: Arc<dyn ReviewStore>,
}

impl AnnotationStore {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    /// Annotations of one provenance, ordered by label id
    pub async fn get_annotations(
        &self,
        image_id: i64,
        provenance: Provenance,
    ) -> Result<Vec<LabelValue>> {
        self.store.fetch_annotations(image_id, provenance).await
    }

    /// Replace every manual annotation of the image with `labels`
    #[instrument(skip(self, labels), fields(label_count = labels.len()))]
    pub async fn set_manual_annotations(&self, image_id: i64, labels: &[LabelValue]) -> Result<()> {
        self.store.replace_manual_annotations(image_id, labels).await?;
        debug!(image_id = image_id, "Manual annotations stored");
        Ok(())
    }

    /// Both provenances of an image
    pub async fn load(&self, image_id: i64) -> Result<ImageAnnotations> {
        let (manual, automatic) = futures::try_join!(
            self.get_annotations(image_id, Provenance::Manual),
            self.get_annotations(image_id, Provenance::Automatic),
        )?;

        Ok(ImageAnnotations { manual, automatic })
    }
}
