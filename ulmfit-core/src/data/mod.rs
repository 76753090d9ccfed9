//! Data providers: labelled text sources, seeded sampling and the
//! train/valid bundles handed to learners.

pub mod bunch;
pub mod provider;
pub mod source;

pub use bunch::{DataBunch, Example, Split};
pub use provider::{DataProvider, DatasetRegistry, TextDataset};
pub use source::{LabeledText, TextSource};
