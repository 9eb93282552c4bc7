//! Prompt templates for the three LLM-driven stages: term discovery, literal
//! translation, and polish. Kept as plain functions rather than a templating
//! crate since every template is parameterized by at most a target-language
//! name and a JSON payload.

/// Human-readable name for a target language code, falling back to the code
/// itself for anything not in the short list the pipeline was built against.
fn language_name(target_lang: &str) -> &str {
    match target_lang {
        "zh" => "Simplified Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        other => other,
    }
}

pub fn term_extraction_prompt(sample_text: &str, target_lang: &str) -> String {
    let lang = language_name(target_lang);
    format!(
        "You are building a bilingual glossary for a subtitle translation project.\n\
         Read the following dialogue sample and identify proper nouns, character names, \
         running jokes, and domain-specific terms that a translator should render consistently.\n\
         Respond with a single JSON object mapping each source-language term to its {lang} translation. \
         Do not include common words or anything you are not reasonably confident about.\n\
         If nothing qualifies, respond with an empty JSON object: {{}}\n\n\
         Dialogue sample:\n{sample_text}"
    )
}

pub fn literal_translation_prompt(items_json: &str, glossary_json: &str, target_lang: &str) -> String {
    let lang = language_name(target_lang);
    format!(
        "Translate the following subtitle lines into {lang}, literally and faithfully, \
         preserving meaning over style. Use this glossary where its terms appear \
         (source term -> required translation): {glossary_json}\n\n\
         Input is a JSON array of objects with \"id\" and \"text\". \
         Respond with a JSON array of the same length, one object per input item in the same order, \
         each with \"id\" (matching the input id) and \"trans\" (the literal translation). \
         Respond with nothing but the JSON array.\n\n\
         Input:\n{items_json}"
    )
}

pub fn polish_prompt(
    items_json: &str,
    glossary_json: &str,
    previous_context: &str,
    future_context: &str,
    target_lang: &str,
) -> String {
    let lang = language_name(target_lang);
    format!(
        "You are polishing literal subtitle translations into natural, idiomatic {lang} \
         suitable for on-screen display: concise, colloquial where appropriate, and consistent \
         with the surrounding dialogue. Use this glossary where its terms appear \
         (source term -> required translation): {glossary_json}\n\n\
         Dialogue immediately before this batch:\n{previous_context}\n\n\
         Dialogue immediately after this batch:\n{future_context}\n\n\
         Input is a JSON array of objects with \"id\", \"original\" (source text), and \"literal\" \
         (a rough literal translation). Respond with a JSON array of the same length, one object \
         per input item in the same order, each with \"id\" (matching the input id) and \"polished\" \
         (the natural, final {lang} translation). Respond with nothing but the JSON array.\n\n\
         Input:\n{items_json}"
    )
}
