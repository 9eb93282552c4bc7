use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("could not read cue stream: {0}")]
    ParseError(String),

    #[error("LLM transport exhausted retries: {0}")]
    TransportError(String),

    #[error("LLM reply could not be salvaged into the expected shape: {0}")]
    ProtocolError(String),

    #[error("glossary or progress storage failure: {0}")]
    StorageError(String),

    #[error("invalid glossary file {file}: {reason}")]
    CurationError { file: String, reason: String },

    #[error("no prompt templates for target language '{0}'")]
    MissingPromptTemplate(String),
}
