use crate::errors::TranslateError;
use crate::glossary::model::{GlossaryTermFile, TaskGlossary};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{error, warn};

const REVERSE_CATEGORY_BLACKLIST: &[&str] = &["idioms", "slang"];

/// Persistent bilingual term store: a curated (authoritative) table and a
/// discovery (machine-proposed) table, plus a file-hash table used to skip
/// re-ingesting unchanged curated files.
///
/// `initialize` runs once before any concurrent users; after that, readers
/// (`extract_terms`) run lock-free against the in-memory index, while writers
/// (`save_terms`) are serialized through `write_lock` and mutate both the
/// sqlite-backed discovery table and the in-memory index together.
pub struct GlossaryStore {
    glossary_dir: PathBuf,
    curated_db_path: PathBuf,
    discovery_db_path: PathBuf,
    enable_discovery: bool,
    reverse: bool,
    index: RwLock<Index>,
    write_lock: Mutex<()>,
}

#[derive(Default)]
struct Index {
    /// lowercased key -> (canonical-case key, target)
    mapping: HashMap<String, (String, String)>,
    automaton: Option<AhoCorasick>,
    /// parallel to automaton pattern ids: lowercased key
    pattern_keys: Vec<String>,
}

impl GlossaryStore {
    pub fn new(
        glossary_dir: impl Into<PathBuf>,
        curated_db_path: impl Into<PathBuf>,
        discovery_db_path: impl Into<PathBuf>,
        enable_discovery: bool,
    ) -> Self {
        Self {
            glossary_dir: glossary_dir.into(),
            curated_db_path: curated_db_path.into(),
            discovery_db_path: discovery_db_path.into(),
            enable_discovery,
            reverse: false,
            index: RwLock::new(Index::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Open both backing stores, create tables if absent, ingest any new or
    /// changed curated files, then load both tables into memory (discovery
    /// first, curated overlaying it so curated always shadows discovery).
    pub fn initialize(&mut self, reverse: bool) -> Result<(), TranslateError> {
        self.reverse = reverse;
        self.init_db(&self.curated_db_path)?;
        if self.enable_discovery {
            self.init_db(&self.discovery_db_path)?;
        }
        self.incremental_update()?;
        self.load_to_memory()?;
        Ok(())
    }

    fn init_db(&self, path: &Path) -> Result<(), TranslateError> {
        let conn = open_conn(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS terms (
                source_term TEXT PRIMARY KEY,
                target_term TEXT,
                category TEXT,
                source_file TEXT,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS file_hashes (
                filename TEXT PRIMARY KEY,
                file_hash TEXT,
                processed_at TIMESTAMP
            );",
        )
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
        Ok(())
    }

    /// Enumerate curated files recursively; re-ingest any whose content
    /// digest differs from the recorded one. Returns the count re-ingested.
    /// Errors on individual files are logged and do not abort the batch.
    pub fn incremental_update(&self) -> Result<usize, TranslateError> {
        if !self.glossary_dir.exists() {
            std::fs::create_dir_all(&self.glossary_dir)
                .map_err(|e| TranslateError::StorageError(e.to_string()))?;
            return Ok(0);
        }

        let conn = open_conn(&self.curated_db_path)?;
        let mut processed: HashMap<String, String> = HashMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT filename, file_hash FROM file_hashes")
                .map_err(|e| TranslateError::StorageError(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|e| TranslateError::StorageError(e.to_string()))?;
            for row in rows {
                let (name, hash) = row.map_err(|e| TranslateError::StorageError(e.to_string()))?;
                processed.insert(name, hash);
            }
        }

        let mut updated_count = 0usize;
        for file_path in walk_json_files(&self.glossary_dir) {
            let filename = file_path
                .strip_prefix(&self.glossary_dir)
                .unwrap_or(&file_path)
                .to_string_lossy()
                .to_string();
            let current_hash = match hash_file(&file_path) {
                Ok(h) => h,
                Err(e) => {
                    error!(file = %filename, error = %e, "failed to hash curated glossary file");
                    continue;
                }
            };
            if processed.get(&filename) == Some(&current_hash) {
                continue;
            }
            match process_single_file(&conn, &file_path, &filename) {
                Ok(()) => {
                    conn.execute(
                        "INSERT OR REPLACE INTO file_hashes (filename, file_hash, processed_at)
                         VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                        rusqlite::params![filename, current_hash],
                    )
                    .map_err(|e| TranslateError::StorageError(e.to_string()))?;
                    updated_count += 1;
                }
                Err(e) => {
                    // Matches the original's actual control flow: a curated
                    // file whose top-level value isn't an array is silently
                    // skipped without raising, so its hash still gets
                    // recorded here (the file is "seen" until it changes).
                    warn!(file = %filename, error = %e, "curated glossary file ingestion issue");
                    conn.execute(
                        "INSERT OR REPLACE INTO file_hashes (filename, file_hash, processed_at)
                         VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                        rusqlite::params![filename, current_hash],
                    )
                    .map_err(|e| TranslateError::StorageError(e.to_string()))?;
                }
            }
        }
        Ok(updated_count)
    }

    fn load_to_memory(&self) -> Result<(), TranslateError> {
        let mut mapping: HashMap<String, (String, String)> = HashMap::new();
        if self.enable_discovery {
            self.load_from_db(&self.discovery_db_path, &mut mapping)?;
        }
        self.load_from_db(&self.curated_db_path, &mut mapping)?;

        let mut index = self.index.write().unwrap();
        index.mapping = mapping;
        rebuild_automaton(&mut index);
        Ok(())
    }

    fn load_from_db(
        &self,
        path: &Path,
        mapping: &mut HashMap<String, (String, String)>,
    ) -> Result<(), TranslateError> {
        if !path.exists() {
            return Ok(());
        }
        let conn = open_conn(path)?;
        let mut stmt = conn
            .prepare("SELECT source_term, target_term, category FROM terms")
            .map_err(|e| TranslateError::StorageError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| TranslateError::StorageError(e.to_string()))?;

        for row in rows {
            let (source, target, category) =
                row.map_err(|e| TranslateError::StorageError(e.to_string()))?;
            if source.trim().is_empty() || target.trim().is_empty() {
                continue;
            }
            if self.reverse {
                if REVERSE_CATEGORY_BLACKLIST.contains(&category.as_str()) {
                    continue;
                }
                for fragment in split_reverse_fragments(&target) {
                    let key = fragment.trim();
                    if key.is_empty() {
                        continue;
                    }
                    mapping.insert(key.to_lowercase(), (key.to_string(), source.clone()));
                }
            } else {
                mapping.insert(source.to_lowercase(), (source.clone(), target.clone()));
            }
        }
        Ok(())
    }

    /// Locate all occurrences of any known source term within `text`,
    /// case-insensitively with leftmost-longest tie-breaking, and return the
    /// distinct matched sources with their canonical target translations.
    pub fn extract_terms(&self, text: &str) -> TaskGlossary {
        let index = self.index.read().unwrap();
        let Some(automaton) = &index.automaton else {
            return TaskGlossary::new();
        };
        let lower = text.to_lowercase();
        let mut found = TaskGlossary::new();
        for m in automaton.find_iter(&lower) {
            let key = &index.pattern_keys[m.pattern().as_usize()];
            if let Some((canonical, target)) = index.mapping.get(key) {
                found.insert(canonical.clone(), target.clone());
            }
        }
        found
    }

    /// Upsert newly-discovered terms: curated always shadows discovery, and
    /// identical existing discovery entries are left untouched.
    pub fn save_terms(&self, terms: &TaskGlossary, category: &str) -> Result<(), TranslateError> {
        if terms.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().unwrap();

        if self.enable_discovery {
            let curated_conn = open_conn(&self.curated_db_path)?;
            let curated_keys = lowercased_keys(&curated_conn)?;

            let discovery_conn = open_conn(&self.discovery_db_path)?;
            let existing_discovery = lowercased_term_map(&discovery_conn)?;

            for (source, target) in terms {
                let s = source.trim();
                let t = target.trim();
                if s.is_empty() || t.is_empty() {
                    continue;
                }
                let s_lower = s.to_lowercase();
                if curated_keys.contains(&s_lower) {
                    continue;
                }
                if existing_discovery.get(&s_lower).map(|v| v.as_str()) == Some(t) {
                    continue;
                }
                discovery_conn
                    .execute(
                        "INSERT OR REPLACE INTO terms (source_term, target_term, category, source_file, updated_at)
                         VALUES (?1, ?2, ?3, 'dynamic_cache', CURRENT_TIMESTAMP)",
                        rusqlite::params![s, t, category],
                    )
                    .map_err(|e| TranslateError::StorageError(e.to_string()))?;
            }
        }

        let mut index = self.index.write().unwrap();
        for (source, target) in terms {
            let s = source.trim();
            let t = target.trim();
            if s.is_empty() || t.is_empty() {
                continue;
            }
            let key = s.to_lowercase();
            index.mapping.entry(key).or_insert_with(|| (s.to_string(), t.to_string()));
        }
        rebuild_automaton(&mut index);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap().mapping.len()
    }
}

fn rebuild_automaton(index: &mut Index) {
    let mut keys: Vec<String> = index.mapping.keys().cloned().collect();
    keys.sort();
    let automaton = if keys.is_empty() {
        None
    } else {
        AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&keys)
            .ok()
    };
    index.pattern_keys = keys;
    index.automaton = automaton;
}

fn split_reverse_fragments(target: &str) -> Vec<String> {
    target.split(['\u{FF0C}', ',']).map(|s| s.to_string()).collect()
}

fn open_conn(path: &Path) -> Result<Connection, TranslateError> {
    Connection::open(path).map_err(|e| TranslateError::StorageError(e.to_string()))
}

fn lowercased_keys(conn: &Connection) -> Result<std::collections::HashSet<String>, TranslateError> {
    let mut stmt = conn
        .prepare("SELECT source_term FROM terms")
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    let mut set = std::collections::HashSet::new();
    for row in rows {
        set.insert(row.map_err(|e| TranslateError::StorageError(e.to_string()))?.to_lowercase());
    }
    Ok(set)
}

fn lowercased_term_map(conn: &Connection) -> Result<HashMap<String, String>, TranslateError> {
    let mut stmt = conn
        .prepare("SELECT source_term, target_term FROM terms")
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    let mut map = HashMap::new();
    for row in rows {
        let (s, t) = row.map_err(|e| TranslateError::StorageError(e.to_string()))?;
        map.insert(s.to_lowercase(), t);
    }
    Ok(map)
}

fn process_single_file(conn: &Connection, path: &Path, filename: &str) -> Result<(), TranslateError> {
    let content = std::fs::read_to_string(path).map_err(|e| TranslateError::CurationError {
        file: filename.to_string(),
        reason: e.to_string(),
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| TranslateError::CurationError {
        file: filename.to_string(),
        reason: e.to_string(),
    })?;
    let Some(array) = value.as_array() else {
        return Err(TranslateError::CurationError {
            file: filename.to_string(),
            reason: "expected a JSON array of term records, found an object".into(),
        });
    };
    for item in array {
        let Ok(term) = serde_json::from_value::<GlossaryTermFile>(item.clone()) else {
            continue;
        };
        let source = term.source_term.trim();
        let target = term.target_term.trim();
        if source.is_empty() || target.is_empty() {
            continue;
        }
        conn.execute(
            "INSERT OR REPLACE INTO terms (source_term, target_term, category, source_file, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)",
            rusqlite::params![source, target, term.category, filename],
        )
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    }
    Ok(())
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn walk_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_json_files(&path));
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            out.push(path);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> GlossaryStore {
        GlossaryStore::new(
            dir.join("glossaries"),
            dir.join("curated.db"),
            dir.join("discovery.db"),
            true,
        )
    }

    #[test]
    fn ingest_then_extract_round_trips_targets() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(
            dir.path().join("glossaries/terms.json"),
            r#"[{"source_term": "Knight Rider", "target_term": "霹雳游侠"}]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        store.initialize(false).unwrap();

        let found = store.extract_terms("Have you seen Knight Rider on TV?");
        assert_eq!(found.get("Knight Rider").unwrap(), "霹雳游侠");
    }

    #[test]
    fn curated_shadows_discovery() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(
            dir.path().join("glossaries/terms.json"),
            r#"[{"source_term": "Knight Rider", "target_term": "霹雳游侠"}]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        store.initialize(false).unwrap();

        let mut discovered = TaskGlossary::new();
        discovered.insert("Knight Rider".to_string(), "骑士骑手".to_string());
        store.save_terms(&discovered, "LLM_Discovered").unwrap();

        let found = store.extract_terms("Knight Rider is great");
        assert_eq!(found.get("Knight Rider").unwrap(), "霹雳游侠");

        let discovery_conn = open_conn(&dir.path().join("discovery.db")).unwrap();
        let count: i64 = discovery_conn
            .query_row("SELECT COUNT(*) FROM terms WHERE source_term = 'Knight Rider'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "curated term must not be written to discovery");
    }

    #[test]
    fn incremental_update_skips_unchanged_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(
            dir.path().join("glossaries/terms.json"),
            r#"[{"source_term": "Foo", "target_term": "Bar"}]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        store.initialize(false).unwrap();
        let second_pass = store.incremental_update().unwrap();
        assert_eq!(second_pass, 0);
    }

    #[test]
    fn object_shaped_curated_file_is_skipped_but_recorded() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(dir.path().join("glossaries/bad.json"), r#"{"not": "a list"}"#).unwrap();

        let mut store = store_in(dir.path());
        store.initialize(false).unwrap();
        assert_eq!(store.len(), 0);

        let second_pass = store.incremental_update().unwrap();
        assert_eq!(second_pass, 0, "unchanged file hash should already be recorded");
    }

    #[test]
    fn reverse_mode_splits_comma_fragments() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(
            dir.path().join("glossaries/terms.json"),
            r#"[{"source_term": "hello", "target_term": "你好,哈喽"}]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        store.initialize(true).unwrap();

        let found = store.extract_terms("你好 there");
        assert_eq!(found.get("你好").unwrap(), "hello");
        let found2 = store.extract_terms("哈喽 there");
        assert_eq!(found2.get("哈喽").unwrap(), "hello");
    }

    #[test]
    fn reverse_mode_excludes_blacklisted_categories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("glossaries")).unwrap();
        std::fs::write(
            dir.path().join("glossaries/terms.json"),
            r#"[{"source_term": "break a leg", "target_term": "祝你好运", "category": "idioms"}]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        store.initialize(true).unwrap();

        let found = store.extract_terms("祝你好运 my friend");
        assert!(found.is_empty());
    }
}
