use serde::{Deserialize, Serialize};

/// A bilingual glossary term as read from a curated glossary file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryTermFile {
    pub source_term: String,
    pub target_term: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "General".to_string()
}

/// A glossary term as stored in the curated or discovery table.
#[derive(Debug, Clone)]
pub struct GlossaryTerm {
    pub source_term: String,
    pub target_term: String,
    pub category: String,
    pub source_file: String,
    pub updated_at: String,
}

/// A task-specific glossary built once per translation run: source -> target.
pub type TaskGlossary = std::collections::HashMap<String, String>;
