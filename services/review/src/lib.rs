//! Review Service
//!
//! Backend for swipe-style image review. A reviewer picks a start date and an
//! optional category, then walks through the matching images one at a time,
//! accepting or rejecting each and optionally attaching labels.
//!
//! ## Features
//!
//! - **Resumable review sessions**: a forward-only cursor over the image
//!   dataset, filtered by creation date and by manually applied category
//!   labels, fetched in small pages
//! - **Label merging**: manual and automatically inferred annotations are
//!   combined into a single view per image
//! - **Signed image access**: short-lived, read-only S3 URLs are issued per
//!   served image
//! - **Decision recording**: accept/reject transitions with wholesale
//!   replacement of manual annotations
//!
//! ## Architecture
//!
//! ```text
//! Reviewer client          Review engine                 PostgreSQL
//! ┌──────────────┐        ┌──────────────┐             ┌──────────────┐
//! │ /submit      │───────▶│ Session      │────────────▶│ images       │
//! │ /img         │◀───────│ Cursor       │  Row        │ labels       │
//! │ /swipe       │───────▶│ State machine│  fetcher    │ annotations  │
//! │ /select      │        └──────────────┘             └──────────────┘
//! └──────────────┘               │
//!                                ▼
//!                         ┌──────────────┐
//!                         │ URL issuer   │──▶ S3 presigned GET
//!                         └──────────────┘
//! ```

pub mod annotations;
pub mod api;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod decisions;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod presigned_urls;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use annotations::{AnnotationStore, ImageAnnotations, NamedLabel};
pub use api::AppState;
pub use catalog::LabelCatalog;
pub use config::Config;
pub use cursor::{Advance, ReviewCursor};
pub use decisions::{Decision, DecisionPayload, ReviewStateMachine};
pub use error::{Result, ReviewError};
pub use fetcher::{PageRequest, RowFetcher};
pub use models::{CategoryFilter, Image, ImageStatus, Label, LabelValue, Provenance};
pub use presigned_urls::{AssetUrlIssuer, ObjectRef, S3UrlSigner, SignedUrl, UrlSigner};
pub use session::{ImageRef, ImageView, ReviewEngine, SessionSnapshot};
pub use store::{PgReviewStore, ReviewStore};
