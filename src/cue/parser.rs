use crate::cue::model::Cue;
use crate::errors::TranslateError;
use tracing::warn;

/// Parses a time-coded subtitle stream into an ordered sequence of cues.
///
/// Strips a leading BOM, normalizes line endings, splits on blank-line
/// separators, and discards malformed blocks with a warning rather than
/// failing the whole parse. Fails only when the input has no usable blocks
/// at all, or is not valid UTF-8 to begin with (the caller is expected to
/// have already decoded the byte stream before calling this).
pub fn parse(input: &str) -> Result<Vec<Cue>, TranslateError> {
    let stripped = input.strip_prefix('\u{feff}').unwrap_or(input);
    let normalized = stripped.replace("\r\n", "\n").replace('\r', "\n");

    let mut cues = Vec::new();
    for raw_block in normalized.split("\n\n") {
        let block = raw_block.trim();
        if block.is_empty() {
            continue;
        }
        match parse_block(block) {
            Some(cue) => cues.push(cue),
            None => warn!(block = %truncate(block, 60), "skipping malformed cue block"),
        }
    }

    if cues.is_empty() {
        return Err(TranslateError::ParseError("no usable cue blocks found".into()));
    }

    Ok(cues)
}

fn parse_block(block: &str) -> Option<Cue> {
    let mut lines = block.lines();
    let id_line = lines.next()?.trim();
    let timestamp_line = lines.next()?.trim();

    let id_is_numeric = id_line.chars().all(|c| c.is_ascii_digit()) && !id_line.is_empty();
    let has_arrow = timestamp_line.contains("-->");
    if !id_is_numeric && !has_arrow {
        return None;
    }

    let text: String = lines.collect::<Vec<_>>().join("\n");
    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let id = id_line.parse::<u64>().unwrap_or(0);
    Some(Cue::new(id, id_line, timestamp_line, text))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.replace('\n', " ")
    } else {
        format!("{}...", &s[..max].replace('\n', " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_stream() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:02,000 --> 00:00:03,000\nWorld\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].id, 1);
        assert_eq!(cues[0].text, "Hello");
        assert_eq!(cues[1].text, "World");
    }

    #[test]
    fn strips_bom_and_normalizes_crlf() {
        let input = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHello\r\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Hello");
    }

    #[test]
    fn joins_multiline_text() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nLine one\nLine two\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues[0].text, "Line one\nLine two");
    }

    #[test]
    fn skips_blocks_with_empty_text() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\n\n\n2\n00:00:02,000 --> 00:00:03,000\nWorld\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "World");
    }

    #[test]
    fn skips_blocks_missing_id_and_arrow() {
        let input = "abc\nnot a timestamp\nsome text\n\n2\n00:00:02,000 --> 00:00:03,000\nWorld\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].id, 2);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse("").is_err());
        assert!(parse("   \n\n  ").is_err());
    }

    #[test]
    fn ids_need_not_be_contiguous_after_filtering() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nA\n\n\n\n5\n00:00:05,000 --> 00:00:06,000\nB\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 5]);
    }
}
