pub mod extractor;
pub mod model;
pub mod store;

pub use model::{GlossaryTerm, GlossaryTermFile, TaskGlossary};
pub use store::GlossaryStore;
