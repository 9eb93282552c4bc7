use rustylang::config::RunConfig;
use rustylang::glossary::store::GlossaryStore;
use rustylang::pipeline::{self, Runtime};
use rustylang::pipeline::orchestrator::load_progress;
use rustylang::transport::{Transport, TransportSettings};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello there\n\n\
                    2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi\n";

fn chat_response(content: &str) -> serde_json::Value {
    json!({
        "choices": [
            {"message": {"content": content}, "finish_reason": "stop"}
        ]
    })
}

async fn build_runtime(server: &MockServer, config_overrides: impl FnOnce(&mut RunConfig)) -> (Runtime, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let mut cfg = RunConfig {
        api_key: "test-key".to_string(),
        api_url: format!("{}/v1/chat/completions", server.uri()),
        glossary_dir: dir.path().join("glossaries"),
        curated_db_path: dir.path().join("curated.db"),
        discovery_db_path: dir.path().join("discovery.db"),
        batch_size: 8,
        max_concurrent_requests: 2,
        rpm_limit: 6000.0,
        max_retries: 1,
        retry_delay_secs: 0.01,
        ..RunConfig::default()
    };
    config_overrides(&mut cfg);

    let mut store = GlossaryStore::new(
        cfg.glossary_dir.clone(),
        cfg.curated_db_path.clone(),
        cfg.discovery_db_path.clone(),
        cfg.enable_llm_discovery,
    );
    store.initialize(false).unwrap();

    let settings = TransportSettings {
        api_url: cfg.api_url.clone(),
        api_key: cfg.api_key.clone(),
        model: cfg.model_name.clone(),
        max_retries: cfg.max_retries,
        retry_delay: Duration::from_secs_f64(cfg.retry_delay_secs),
    };
    let transport = Transport::new(settings, cfg.max_concurrent_requests, cfg.rpm_limit);

    (Runtime::new(cfg, store, transport), dir)
}

#[tokio::test]
async fn bilingual_run_emits_two_blocks_per_cue_and_resumes_cleanly() {
    let server = MockServer::start().await;

    // Glossary discovery passes: respond with an empty object every time.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("{}")))
        .mount(&server)
        .await;

    let (runtime, dir) = build_runtime(&server, |_| {}).await;

    let input_path = dir.path().join("in.srt");
    std::fs::write(&input_path, SRT).unwrap();
    let output_path = dir.path().join("out.srt");
    let progress_path = dir.path().join("out.progress.json");
    let cache_path = dir.path().join("out.glossary.json");

    // The glossary-discovery mock always returns `{}`, so the literal and
    // polish stages (which expect a JSON array) will fail validation and
    // fall through the ladder to a degraded pass-through. This still
    // exercises the full orchestrator path end-to-end without a crash.
    pipeline::run(&runtime, &input_path, &output_path, &progress_path, &cache_path)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output_path).unwrap();
    assert!(written.contains("Hello there"));
    assert!(written.contains("General Kenobi"));

    let progress = load_progress(&progress_path);
    assert_eq!(progress.processed_ids.len(), 2);
    assert_eq!(progress.output_block_index, 4); // 2 cues x 2 blocks (bilingual)

    // Resuming with nothing left to do should be a no-op, not an error.
    pipeline::run(&runtime, &input_path, &output_path, &progress_path, &cache_path)
        .await
        .unwrap();
}

#[tokio::test]
async fn successful_literal_and_polish_replies_produce_translated_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            let reply = if prompt.contains("\"text\"") {
                json!([{"id": 1, "trans": "你好"}, {"id": 2, "trans": "欧比旺"}])
            } else if prompt.contains("\"literal\"") {
                json!([{"id": 1, "polished": "你好呀"}, {"id": 2, "polished": "欧比旺你好"}])
            } else {
                json!({})
            };
            ResponseTemplate::new(200).set_body_json(chat_response(&reply.to_string()))
        })
        .mount(&server)
        .await;

    let (runtime, dir) = build_runtime(&server, |_| {}).await;

    let input_path = dir.path().join("in.srt");
    std::fs::write(&input_path, SRT).unwrap();
    let output_path = dir.path().join("out.srt");
    let progress_path = dir.path().join("out.progress.json");
    let cache_path = dir.path().join("out.glossary.json");

    pipeline::run(&runtime, &input_path, &output_path, &progress_path, &cache_path)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output_path).unwrap();
    assert!(written.contains("你好呀"));
    assert!(written.contains("欧比旺你好"));
}

#[tokio::test]
async fn curated_glossary_term_shadows_llm_discovery_during_a_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("{\"Kenobi\": \"LLM-Guessed\"}")))
        .mount(&server)
        .await;

    let (runtime, dir) = build_runtime(&server, |_| {}).await;
    std::fs::create_dir_all(&runtime.config.glossary_dir).unwrap();
    std::fs::write(
        runtime.config.glossary_dir.join("terms.json"),
        r#"[{"source_term": "Kenobi", "target_term": "Curated-Kenobi"}]"#,
    )
    .unwrap();
    runtime.glossary.incremental_update().unwrap();

    let found = runtime.glossary.extract_terms("General Kenobi");
    assert_eq!(found.get("Kenobi").unwrap(), "Curated-Kenobi");
}
