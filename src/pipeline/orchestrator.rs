use crate::config::RunConfig;
use crate::cue::format::format_block;
use crate::cue::{self, Cue};
use crate::errors::TranslateError;
use crate::glossary::extractor::extract_global_terms;
use crate::glossary::model::TaskGlossary;
use crate::glossary::store::GlossaryStore;
use crate::json_utils::{read_json_file, write_json_atomic};
use crate::pipeline::ladder;
use crate::pipeline::stage::{LiteralStage, PolishStage, StageContext};
use crate::transport::Transport;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

const PREFETCH_WINDOW: usize = 3;
const CONTEXT_WINDOW: usize = 3;

/// Resumable progress for one translation run, persisted next to the output
/// file. A missing or corrupt file is treated as a fresh start rather than
/// an error, matching how the rest of this pipeline fails open on storage
/// noise instead of losing a partially-finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunProgress {
    pub processed_ids: HashSet<u64>,
    pub last_context: String,
    pub output_block_index: u64,
}

pub fn load_progress(path: &Path) -> RunProgress {
    match read_json_file(path) {
        Ok(serde_json::Value::Null) => RunProgress::default(),
        Ok(value) => serde_json::from_value(value).unwrap_or_default(),
        Err(_) => RunProgress::default(),
    }
}

fn save_progress(path: &Path, progress: &RunProgress) -> Result<(), TranslateError> {
    let value = serde_json::to_value(progress).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    write_json_atomic(path, &value)
}

/// Everything a run needs that would otherwise have lived behind a module
/// singleton: the shared transport (rate limiter + concurrency gate built
/// in), the glossary store, and the run's fixed configuration. Threading
/// this explicitly means two runs can exist side by side in the same
/// process with entirely independent rate limits and glossaries.
pub struct Runtime {
    pub config: Arc<RunConfig>,
    pub transport: Transport,
    pub glossary: Arc<GlossaryStore>,
}

impl Runtime {
    pub fn new(config: RunConfig, glossary: GlossaryStore, transport: Transport) -> Self {
        Self { config: Arc::new(config), transport, glossary: Arc::new(glossary) }
    }
}

pub async fn run(
    runtime: &Runtime,
    input_path: &Path,
    output_path: &Path,
    progress_path: &Path,
    glossary_cache_path: &Path,
) -> Result<(), TranslateError> {
    let source = std::fs::read_to_string(input_path).map_err(|e| TranslateError::ParseError(e.to_string()))?;
    let cues = cue::parser::parse(&source)?;
    info!(count = cues.len(), "parsed cue stream");

    let task_glossary = load_or_extract_task_glossary(runtime, &cues, glossary_cache_path).await?;

    let mut progress = load_progress(progress_path);
    if progress.output_block_index == 0 && progress.processed_ids.is_empty() && output_path.exists() {
        std::fs::write(output_path, "").map_err(|e| TranslateError::StorageError(e.to_string()))?;
    }

    let remaining: Vec<Cue> = cues.iter().filter(|c| !progress.processed_ids.contains(&c.id)).cloned().collect();
    if remaining.is_empty() {
        info!("nothing left to translate; run already complete");
        return Ok(());
    }

    let batches: Vec<Vec<Cue>> = remaining.chunks(runtime.config.batch_size).map(|c| c.to_vec()).collect();
    let mut rolling_context: VecDeque<(String, String)> =
        parse_rolling_context(&progress.last_context).into_iter().collect();

    let mut literal_tasks: HashMap<usize, JoinHandle<HashMap<u64, String>>> = HashMap::new();
    for idx in 0..batches.len().min(PREFETCH_WINDOW) {
        literal_tasks.insert(idx, spawn_literal(runtime, &batches[idx], &task_glossary));
    }

    let bar = ProgressBar::new(remaining.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} translating [{bar:30}] {pos}/{len} cues")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for (idx, batch) in batches.iter().enumerate() {
        let next_prefetch = idx + PREFETCH_WINDOW;
        if next_prefetch < batches.len() {
            literal_tasks.insert(next_prefetch, spawn_literal(runtime, &batches[next_prefetch], &task_glossary));
        }

        let handle = literal_tasks
            .remove(&idx)
            .unwrap_or_else(|| spawn_literal(runtime, batch, &task_glossary));
        let literal = handle.await.map_err(|e| TranslateError::TransportError(e.to_string()))?;

        let future_context = future_context_for(&batches, idx + 1);
        let previous_context = render_context(&rolling_context);
        let glossary_json = glossary_json_for(&task_glossary, batch);
        let ctx = StageContext {
            glossary_json,
            previous_context,
            future_context,
        };

        let polish_stage = PolishStage { literal: &literal };
        let polished = ladder::rescue(
            &polish_stage,
            &runtime.transport,
            batch,
            &ctx,
            &runtime.config.target_lang,
            runtime.config.temp_polish,
        )
        .await;

        append_checkpoint(output_path, batch, &polished, runtime.config.bilingual, &mut progress)?;

        for cue in batch {
            let text = polished.get(&cue.id).cloned().unwrap_or_else(|| cue.text.clone());
            rolling_context.push_back((cue.text.clone(), text));
            while rolling_context.len() > CONTEXT_WINDOW {
                rolling_context.pop_front();
            }
            progress.processed_ids.insert(cue.id);
        }
        progress.last_context = render_context(&rolling_context);
        save_progress(progress_path, &progress)?;
        bar.inc(batch.len() as u64);
    }
    bar.finish_and_clear();

    info!(cues = remaining.len(), "translation run complete");
    Ok(())
}

fn spawn_literal(runtime: &Runtime, batch: &[Cue], task_glossary: &TaskGlossary) -> JoinHandle<HashMap<u64, String>> {
    let transport = runtime.transport.clone();
    let target_lang = runtime.config.target_lang.clone();
    let temperature = runtime.config.temp_literal;
    let batch = batch.to_vec();
    let glossary_json = glossary_json_for(task_glossary, &batch);

    tokio::spawn(async move {
        let ctx = StageContext { glossary_json, previous_context: String::new(), future_context: String::new() };
        ladder::rescue(&LiteralStage, &transport, &batch, &ctx, &target_lang, temperature).await
    })
}

fn glossary_json_for(task_glossary: &TaskGlossary, batch: &[Cue]) -> String {
    let relevant: HashMap<&str, &str> = task_glossary
        .iter()
        .filter(|(k, _)| batch.iter().any(|c| c.text.to_lowercase().contains(&k.to_lowercase())))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    serde_json::to_string(&relevant).unwrap_or_else(|_| "{}".to_string())
}

fn future_context_for(batches: &[Vec<Cue>], next_idx: usize) -> String {
    match batches.get(next_idx) {
        Some(batch) => batch.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n"),
        None => "None".to_string(),
    }
}

fn render_context(rolling: &VecDeque<(String, String)>) -> String {
    if rolling.is_empty() {
        return "None".to_string();
    }
    rolling.iter().map(|(orig, polished)| format!("- {orig} -> {polished}")).collect::<Vec<_>>().join("\n")
}

fn parse_rolling_context(_serialized: &str) -> Vec<(String, String)> {
    // The rolling context is persisted as its rendered display form, which
    // is lossy by design: on resume we simply begin the window empty again
    // rather than trying to recover structured pairs from prose. The first
    // post-resume batch reads "None" for previous_context exactly as a
    // first-ever run would.
    Vec::new()
}

async fn load_or_extract_task_glossary(
    runtime: &Runtime,
    cues: &[Cue],
    cache_path: &Path,
) -> Result<TaskGlossary, TranslateError> {
    if let Ok(value) = read_json_file(cache_path) {
        if !value.is_null() {
            if let Ok(map) = serde_json::from_value::<TaskGlossary>(value) {
                return Ok(map);
            }
        }
    }

    let historical: TaskGlossary = cues
        .iter()
        .flat_map(|c| runtime.glossary.extract_terms(&c.text))
        .collect();

    let merged = extract_global_terms(
        cues,
        &runtime.config.target_lang,
        &historical,
        &runtime.transport,
        runtime.config.temp_terms,
    )
    .await;

    runtime.glossary.save_terms(&merged, "LLM_Discovered")?;

    let value = serde_json::to_value(&merged).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    write_json_atomic(cache_path, &value)?;

    Ok(merged)
}

fn append_checkpoint(
    output_path: &Path,
    batch: &[Cue],
    polished: &HashMap<u64, String>,
    bilingual: bool,
    progress: &mut RunProgress,
) -> Result<(), TranslateError> {
    let mut out = String::new();
    for cue in batch {
        let translated = polished.get(&cue.id).cloned().unwrap_or_else(|| cue.text.clone());

        if bilingual {
            progress.output_block_index += 1;
            out.push_str(&format_block(progress.output_block_index, &cue.timestamp, &cue.text));
        }

        progress.output_block_index += 1;
        out.push_str(&format_block(progress.output_block_index, &cue.timestamp, &translated));
    }

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_path)
        .map_err(|e| TranslateError::StorageError(e.to_string()))?;
    file.write_all(out.as_bytes()).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cues(n: u64) -> Vec<Cue> {
        (1..=n)
            .map(|i| Cue::new(i, i.to_string(), format!("00:00:0{i},000 --> 00:00:0{i},500"), format!("line {i}")))
            .collect()
    }

    #[test]
    fn progress_round_trips_through_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut progress = RunProgress::default();
        progress.processed_ids.insert(1);
        progress.processed_ids.insert(2);
        progress.output_block_index = 4;
        save_progress(&path, &progress).unwrap();

        let back = load_progress(&path);
        assert_eq!(back.output_block_index, 4);
        assert!(back.processed_ids.contains(&1));
    }

    #[test]
    fn missing_progress_file_is_a_fresh_start() {
        let dir = tempdir().unwrap();
        let progress = load_progress(&dir.path().join("nope.json"));
        assert_eq!(progress.output_block_index, 0);
        assert!(progress.processed_ids.is_empty());
    }

    #[test]
    fn render_context_defaults_to_none() {
        let rolling: VecDeque<(String, String)> = VecDeque::new();
        assert_eq!(render_context(&rolling), "None");
    }

    #[test]
    fn render_context_formats_recent_pairs() {
        let mut rolling = VecDeque::new();
        rolling.push_back(("hello".to_string(), "你好".to_string()));
        let rendered = render_context(&rolling);
        assert_eq!(rendered, "- hello -> 你好");
    }

    #[test]
    fn checkpoint_emits_two_blocks_per_cue_in_bilingual_mode() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("out.srt");
        let batch = cues(1);
        let mut polished = HashMap::new();
        polished.insert(1, "你好".to_string());
        let mut progress = RunProgress::default();

        append_checkpoint(&output_path, &batch, &polished, true, &mut progress).unwrap();

        let written = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(progress.output_block_index, 2);
        assert!(written.contains("你好"));
        assert!(written.contains("line 1"));
    }

    #[test]
    fn checkpoint_emits_one_block_per_cue_when_not_bilingual() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("out.srt");
        let batch = cues(1);
        let mut polished = HashMap::new();
        polished.insert(1, "你好".to_string());
        let mut progress = RunProgress::default();

        append_checkpoint(&output_path, &batch, &polished, false, &mut progress).unwrap();
        assert_eq!(progress.output_block_index, 1);
    }
}
