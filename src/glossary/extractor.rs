use crate::cue::Cue;
use crate::glossary::model::TaskGlossary;
use crate::json_salvage::{salvage, LLMValue};
use crate::pipeline::prompts::term_extraction_prompt;
use crate::transport::{ChatMessage, Transport};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tracing::warn;

const MAX_SAMPLE_LEN: usize = 4000;

/// Mine a task-specific glossary from the episode's own dialogue by asking
/// the model to propose bilingual term pairs over several independent
/// samples, then merging what it returns with any already-known terms.
///
/// The number of passes scales with transcript length (`max(5, ceil(n/100))`)
/// so a long episode gets proportionally more sampling coverage without
/// flooding a short one with redundant passes over the same handful of cues.
pub async fn extract_global_terms(
    cues: &[Cue],
    target_lang: &str,
    historical_glossary: &TaskGlossary,
    transport: &Transport,
    temperature: f32,
) -> TaskGlossary {
    if cues.is_empty() {
        return historical_glossary.clone();
    }

    let num_passes = std::cmp::max(5, (cues.len() as f64 / 100.0).ceil() as usize);
    let parts = build_sample_parts(cues, num_passes);

    let bar = ProgressBar::new(parts.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} glossary discovery [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let results = stream::iter(parts.into_iter().enumerate())
        .map(|(idx, (pass, part))| {
            let bar = bar.clone();
            let target_lang = target_lang.to_string();
            async move {
                let out = extract_from_sample(&part, &target_lang, transport, temperature).await;
                bar.inc(1);
                if out.is_empty() {
                    warn!(pass, part = idx, "glossary discovery pass returned nothing usable");
                }
                out
            }
        })
        .buffer_unordered(4)
        .collect::<Vec<_>>()
        .await;
    bar.finish_and_clear();

    let mut merged: TaskGlossary = HashMap::new();
    for pass in results {
        merged.extend(pass);
    }
    for (k, v) in historical_glossary {
        merged.entry(k.clone()).or_insert_with(|| v.clone());
    }
    merged
}

/// For each pass `p` in `0..num_passes`, sample cues at the stride `{p, p+P,
/// p+2P, ...}`, concatenate their text, then split that sampled text into
/// parts of at most `MAX_SAMPLE_LEN` characters. Returns a flat list of
/// `(pass_index, part_text)` so every part can be dispatched independently
/// while still being attributable to its originating pass for logging.
fn build_sample_parts(cues: &[Cue], num_passes: usize) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for pass in 0..num_passes {
        let sampled: Vec<&str> = cues.iter().skip(pass).step_by(num_passes).map(|c| c.text.as_str()).collect();
        if sampled.is_empty() {
            continue;
        }
        let sampled_text = sampled.join("\n");
        for part in split_into_parts(&sampled_text, MAX_SAMPLE_LEN) {
            out.push((pass, part));
        }
    }
    out
}

fn split_into_parts(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    while start < bytes.len() {
        let mut end = (start + max_len).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        parts.push(text[start..end].to_string());
        start = end;
    }
    parts
}

async fn extract_from_sample(sample: &str, target_lang: &str, transport: &Transport, temperature: f32) -> TaskGlossary {
    let prompt = term_extraction_prompt(sample, target_lang);
    let messages = vec![ChatMessage::user(prompt)];

    let reply = match transport.call(&messages, temperature).await {
        Ok(Some(text)) => text,
        Ok(None) => return TaskGlossary::new(),
        Err(e) => {
            warn!(error = %e, "glossary discovery request failed");
            return TaskGlossary::new();
        }
    };

    match salvage(&reply) {
        LLMValue::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        _ => TaskGlossary::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_short_cue_list_yields_one_part_per_pass_that_has_it() {
        let cues = vec![Cue::new(1, "1", "00:00:01,000 --> 00:00:02,000", "hello there")];
        let parts = build_sample_parts(&cues, 5);
        // Stride sampling with P=5 over 1 cue: only pass 0 ever lands on it.
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], (0, "hello there".to_string()));
    }

    #[test]
    fn stride_sampling_distributes_cues_across_passes() {
        let cues: Vec<Cue> = (1..=10)
            .map(|i| Cue::new(i, i.to_string(), "00:00:01,000 --> 00:00:02,000", format!("cue{i}")))
            .collect();
        let parts = build_sample_parts(&cues, 5);
        // 10 cues over 5 passes, one cue per pass (no part splitting needed).
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().any(|(p, text)| *p == 0 && text.contains("cue1") && text.contains("cue6")));
    }

    #[test]
    fn long_sampled_text_splits_into_multiple_parts() {
        let long_text = "word ".repeat(2000);
        let parts = split_into_parts(&long_text, MAX_SAMPLE_LEN);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.len() <= MAX_SAMPLE_LEN));
    }
}
