/// Formats a single output block in the same shape the parser accepts.
pub fn format_block(index: u64, timestamp: &str, text: &str) -> String {
    format!("{}\n{}\n{}\n\n", index, timestamp, text)
}
