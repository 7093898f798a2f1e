//! Image enrichment: caption queue, merge-back, and worker pipeline.
//!
//! Crawls register extracted media here; captioning workers lease images,
//! run a caption model, and submit text that is merged back into the
//! owning documents' `caption` field. The sqlite side-store is the
//! durable source of caption truth; indexes carry derived copies.

mod errors;
mod merge;
mod queue;
mod store;
mod worker;

pub use errors::{EnrichError, EnrichResult};
pub use merge::merge_into_post;
pub use queue::{AcceptReport, EnrichmentQueue};
pub use store::{
    AcceptOutcome, AcceptedImage, CaptionResult, CaptionStore, CaptionedImage, ImageState,
    OfferBatch, OfferedImage, QueueStats,
};
pub use worker::{BatchReport, CaptionWorker, Captioner};
