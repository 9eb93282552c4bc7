use crate::cue::Cue;
use crate::errors::TranslateError;
use crate::json_salvage::LLMValue;
use crate::pipeline::prompts::{literal_translation_prompt, polish_prompt};
use std::collections::HashMap;

/// Context threaded through a single batch: the task glossary already
/// filtered to terms present in the batch, and (for the polish stage) the
/// rolling window of recently-translated dialogue.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    pub glossary_json: String,
    pub previous_context: String,
    pub future_context: String,
}

/// Generalizes the literal and polish stages, which differ only in prompt
/// shape, the JSON field they expect back, and what a degraded (LLM
/// unavailable) fallback item looks like.
pub trait StageStrategy {
    /// Build the user-message prompt for one batch of cues.
    fn build_prompt(&self, batch: &[Cue], ctx: &StageContext, target_lang: &str) -> String;

    /// Validate and extract this stage's output field from a salvaged LLM
    /// reply, keyed by cue id. Fails closed: any structural mismatch
    /// (wrong length, unparseable id, missing id, missing field) is an error
    /// rather than a best-effort partial result, since a ladder rescue
    /// attempt at a smaller batch size is strictly safer than guessing which
    /// half of a malformed reply to trust.
    fn validate(&self, batch: &[Cue], value: &LLMValue) -> Result<HashMap<u64, String>, TranslateError>;

    /// Pass-through text used when every ladder rung has been exhausted for
    /// a single cue.
    fn degraded_item(&self, cue: &Cue) -> String;

    /// Field name this stage extracts, for error messages.
    fn field_name(&self) -> &'static str;

    /// Recompute the rolling `previous_context` after `chunk` succeeds
    /// (including the single-cue degraded fallback), so the next chunk in
    /// the same ladder rescue is prompted with up-to-date context instead
    /// of whatever the batch started with. No-op for stages that don't
    /// thread context between chunks.
    fn context_update(&self, _chunk: &[Cue], _results: &HashMap<u64, String>, ctx: &StageContext) -> StageContext {
        ctx.clone()
    }
}

pub struct LiteralStage;

impl StageStrategy for LiteralStage {
    fn build_prompt(&self, batch: &[Cue], ctx: &StageContext, target_lang: &str) -> String {
        let items: Vec<_> = batch
            .iter()
            .map(|c| serde_json::json!({"id": c.id, "text": c.text}))
            .collect();
        let items_json = serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string());
        literal_translation_prompt(&items_json, &ctx.glossary_json, target_lang)
    }

    fn validate(&self, batch: &[Cue], value: &LLMValue) -> Result<HashMap<u64, String>, TranslateError> {
        validate_array(batch, value, "trans")
    }

    fn degraded_item(&self, cue: &Cue) -> String {
        cue.text.clone()
    }

    fn field_name(&self) -> &'static str {
        "trans"
    }
}

/// Literal translations for the current batch, keyed by cue id; the polish
/// stage reads through this to build its `original`/`literal` pairs.
pub struct PolishStage<'a> {
    pub literal: &'a HashMap<u64, String>,
}

impl<'a> StageStrategy for PolishStage<'a> {
    fn build_prompt(&self, batch: &[Cue], ctx: &StageContext, target_lang: &str) -> String {
        let items: Vec<_> = batch
            .iter()
            .map(|c| {
                let literal = self.literal.get(&c.id).cloned().unwrap_or_else(|| c.text.clone());
                serde_json::json!({"id": c.id, "original": c.text, "literal": literal})
            })
            .collect();
        let items_json = serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string());
        polish_prompt(&items_json, &ctx.glossary_json, &ctx.previous_context, &ctx.future_context, target_lang)
    }

    fn validate(&self, batch: &[Cue], value: &LLMValue) -> Result<HashMap<u64, String>, TranslateError> {
        validate_array(batch, value, "polished")
    }

    fn degraded_item(&self, cue: &Cue) -> String {
        self.literal.get(&cue.id).cloned().unwrap_or_else(|| cue.text.clone())
    }

    fn field_name(&self) -> &'static str {
        "polished"
    }

    fn context_update(&self, chunk: &[Cue], results: &HashMap<u64, String>, ctx: &StageContext) -> StageContext {
        let mut lines: Vec<String> = if ctx.previous_context.trim() == "None" || ctx.previous_context.is_empty() {
            Vec::new()
        } else {
            ctx.previous_context.lines().map(str::to_string).collect()
        };
        for cue in chunk {
            let polished = results.get(&cue.id).cloned().unwrap_or_else(|| cue.text.clone());
            lines.push(format!("- {} -> {}", cue.text, polished));
        }
        let tail: Vec<String> = lines.into_iter().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
        StageContext {
            glossary_json: ctx.glossary_json.clone(),
            previous_context: if tail.is_empty() { "None".to_string() } else { tail.join("\n") },
            future_context: ctx.future_context.clone(),
        }
    }
}

fn validate_array(
    batch: &[Cue],
    value: &LLMValue,
    field: &str,
) -> Result<HashMap<u64, String>, TranslateError> {
    let array = value.as_array().ok_or_else(|| {
        TranslateError::ProtocolError(format!("expected a JSON array, field `{field}`"))
    })?;

    if array.len() != batch.len() {
        return Err(TranslateError::ProtocolError(format!(
            "expected {} items, got {}",
            batch.len(),
            array.len()
        )));
    }

    let expected_ids: std::collections::HashSet<u64> = batch.iter().map(|c| c.id).collect();
    let mut out = HashMap::with_capacity(batch.len());

    for item in array {
        let obj = item
            .as_object()
            .ok_or_else(|| TranslateError::ProtocolError("expected an object per item".to_string()))?;
        let id = obj
            .get("id")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| TranslateError::ProtocolError("item missing parseable `id`".to_string()))?;
        if !expected_ids.contains(&id) {
            return Err(TranslateError::ProtocolError(format!("unexpected id {id} in reply")));
        }
        let text = obj
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| TranslateError::ProtocolError(format!("item {id} missing `{field}`")))?;
        out.insert(id, text.to_string());
    }

    if out.len() != expected_ids.len() {
        return Err(TranslateError::ProtocolError("reply ids do not match batch ids".to_string()));
    }

    Ok(out)
}
