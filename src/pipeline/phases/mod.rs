//! Pipeline stages, in execution order

#[path = "01_fetch.rs"]
pub mod fetch;
#[path = "02_normalize.rs"]
pub mod normalize;
#[path = "03_categorize.rs"]
pub mod categorize;
#[path = "04_synthesize.rs"]
pub mod synthesize;
