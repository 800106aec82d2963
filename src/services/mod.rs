//! Harvesting and processing services.

mod harvester;
mod processor;

pub use harvester::{HarvestOutcome, HarvestReport, Harvester};
pub use processor::{ProcessSummary, Processor};
