pub mod selector;
pub mod summary;
pub mod target;

pub use selector::{ElementState, Selector, Strategy};
pub use summary::{OfferSummary, SummaryItem};
pub use target::{Requirement, TargetDescriptor};
