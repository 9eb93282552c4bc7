pub mod cli;
pub mod config;
pub mod cue;
pub mod errors;
pub mod glossary;
pub mod json_salvage;
pub mod json_utils;
pub mod pipeline;
pub mod transport;
