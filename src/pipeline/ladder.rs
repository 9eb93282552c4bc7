use crate::cue::Cue;
use crate::json_salvage::salvage;
use crate::pipeline::stage::{StageContext, StageStrategy};
use crate::transport::{ChatMessage, Transport};
use std::collections::HashMap;

/// Descending batch sizes tried at each cursor position once the natural
/// (largest-fitting) size fails to validate. Reaching the end of the
/// ladder at a given position means falling back to a single-cue,
/// best-effort-only translation and advancing past it.
const LADDER: [usize; 5] = [8, 6, 4, 2, 1];

/// Recover a batch that may fail normal processing by walking a cursor
/// across it, trying the largest ladder rung that fits what remains first
/// and shrinking to smaller rungs *at the same cursor position* before
/// giving up on a single cue and moving on.
///
/// Every cue in `batch` is guaranteed an entry in the returned map: the
/// worst case is a degraded pass-through, never a dropped cue.
pub async fn rescue<S>(
    strategy: &S,
    transport: &Transport,
    batch: &[Cue],
    ctx: &StageContext,
    target_lang: &str,
    temperature: f32,
) -> HashMap<u64, String>
where
    S: StageStrategy + Sync,
{
    let mut result = HashMap::with_capacity(batch.len());
    let mut running_ctx = ctx.clone();
    let mut i = 0;

    while i < batch.len() {
        let remaining = batch.len() - i;
        let mut advanced = false;

        for &rung in LADDER.iter() {
            if rung > remaining {
                continue;
            }
            let chunk = &batch[i..i + rung];
            if let Some(map) =
                attempt_chunk(strategy, transport, chunk, &running_ctx, target_lang, temperature).await
            {
                running_ctx = strategy.context_update(chunk, &map, &running_ctx);
                result.extend(map);
                i += rung;
                advanced = true;
                break;
            }
        }

        if !advanced {
            let single = std::slice::from_ref(&batch[i]);
            let map = degraded(strategy, single);
            running_ctx = strategy.context_update(single, &map, &running_ctx);
            result.extend(map);
            i += 1;
        }
    }

    result
}

/// Attempt A: two tries at the chunk with full glossary and context.
/// Attempt B: one try with glossary and context stripped, in case the
/// extra instructions themselves are confusing a struggling model.
async fn attempt_chunk<S>(
    strategy: &S,
    transport: &Transport,
    chunk: &[Cue],
    ctx: &StageContext,
    target_lang: &str,
    temperature: f32,
) -> Option<HashMap<u64, String>>
where
    S: StageStrategy,
{
    for _ in 0..2 {
        if let Some(map) = try_once(strategy, transport, chunk, ctx, target_lang, temperature).await {
            return Some(map);
        }
    }

    let stripped = StageContext {
        glossary_json: "{}".to_string(),
        previous_context: "None".to_string(),
        future_context: "None".to_string(),
    };
    try_once(strategy, transport, chunk, &stripped, target_lang, temperature).await
}

async fn try_once<S>(
    strategy: &S,
    transport: &Transport,
    chunk: &[Cue],
    ctx: &StageContext,
    target_lang: &str,
    temperature: f32,
) -> Option<HashMap<u64, String>>
where
    S: StageStrategy,
{
    let prompt = strategy.build_prompt(chunk, ctx, target_lang);
    let messages = [ChatMessage::user(prompt)];
    let reply = transport.call(&messages, temperature).await.ok().flatten()?;
    let salvaged = salvage(&reply);
    strategy.validate(chunk, &salvaged).ok()
}

fn degraded<S: StageStrategy>(strategy: &S, batch: &[Cue]) -> HashMap<u64, String> {
    batch.iter().map(|c| (c.id, strategy.degraded_item(c))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::LiteralStage;

    fn cues(n: u64) -> Vec<Cue> {
        (1..=n)
            .map(|i| Cue::new(i, i.to_string(), "00:00:01,000 --> 00:00:02,000", format!("line {i}")))
            .collect()
    }

    #[test]
    fn degraded_covers_every_cue() {
        let batch = cues(3);
        let out = degraded(&LiteralStage, &batch);
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(&1).unwrap(), "line 1");
    }

    #[test]
    fn ladder_shrinks_down_to_singletons() {
        // Sanity check on the ladder's shape: it must bottom out at 1 so
        // rescue always terminates rather than looping on an empty chunk.
        assert_eq!(*LADDER.last().unwrap(), 1);
        assert!(LADDER.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn partitions_cover_full_batch_at_each_rung() {
        let batch = cues(8);
        for rung in LADDER {
            let total: usize = batch.chunks(rung).map(|c| c.len()).sum();
            assert_eq!(total, batch.len());
        }
    }
}
