use std::{env, sync::Arc};

use docqa_answer::RagService;
use docqa_core::config::{expand_path, AppConfig};
use docqa_core::types::PresentationMode;
use docqa_embed::embedder_from_config;
use docqa_lexical::LexicalIndexer;
use docqa_llm::ChatClient;
use docqa_vector::RestVectorIndex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <question> [--json]", args[0]);
        eprintln!("Example: {} 'What is the capital of France?'", args[0]);
        std::process::exit(1);
    }
    let question = &args[1];
    let as_json = args.iter().any(|a| a == "--json");

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;

    let lexical_dir = expand_path(&config.data.lexical_index_dir);
    let lexical = LexicalIndexer::open(&lexical_dir)?;
    let chunks = lexical.all_chunks()?;

    let embedder = embedder_from_config(&config.services)?;
    let vector = RestVectorIndex::new(&config.services.vector, config.services.retry.clone())?;
    let model = Arc::new(ChatClient::new(
        &config.services.llm,
        &config.generation.model,
        config.generation.temperature,
    )?);

    let service = RagService::new(lexical, vector, embedder, model, &config);
    service.restore(chunks).await?;

    let answer = service.answer(question).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("🔍 {question}\n");
    println!("{}\n", answer.text);
    match answer.mode {
        PresentationMode::Direct => {
            println!("Confidence: {:.0}%", answer.confidence * 100.0);
        }
        PresentationMode::Warned => {
            println!("⚠️  Confidence: {:.0}% (see cautions above)", answer.confidence * 100.0);
        }
        PresentationMode::Fallback => {
            println!("⚠️  The document did not support a confident answer.");
        }
    }
    if !answer.citations.is_empty() {
        println!("Cited chunks: {}", answer.citations.join(", "));
    }
    Ok(())
}
