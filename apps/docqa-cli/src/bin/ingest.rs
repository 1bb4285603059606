use std::{env, path::PathBuf, sync::Arc};

use indicatif::{ProgressBar, ProgressStyle};

use docqa_answer::HybridRetriever;
use docqa_core::chunker::Chunker;
use docqa_core::config::{expand_path, AppConfig};
use docqa_core::metrics::Metrics;
use docqa_core::traits::Embedder;
use docqa_embed::embedder_from_config;
use docqa_lexical::LexicalIndexer;
use docqa_vector::RestVectorIndex;

const EMBED_BATCH: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut data_dir = None;
    let mut limit = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                if let Some(n) = args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                    limit = Some(n);
                    i += 1;
                } else {
                    eprintln!("Error: --limit requires a number");
                    std::process::exit(1);
                }
            }
            arg if !arg.starts_with('-') => data_dir = Some(PathBuf::from(arg)),
            _ => {}
        }
        i += 1;
    }
    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from("./data/txt"));

    println!("docqa indexer\n=============");
    println!("Data directory: {}", data_dir.display());

    let chunker = Chunker::new();
    let mut chunks = chunker.process_directory(&data_dir)?;
    if let Some(limit) = limit {
        if chunks.len() > limit {
            chunks.truncate(limit);
            println!("🔢 Limited to first {limit} chunks");
        }
    }
    if chunks.is_empty() {
        println!("No .txt files found under {}.", data_dir.display());
        return Ok(());
    }
    println!("Chunked document into {} chunks", chunks.len());

    let embedder = embedder_from_config(&config.services)?;
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
            .unwrap()
            .progress_chars("#>-"),
    );
    for batch in chunks.chunks_mut(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
            pb.inc(1);
        }
    }
    pb.finish_with_message("embeddings computed");

    let lexical_dir = expand_path(&config.data.lexical_index_dir);
    let lexical = LexicalIndexer::create(lexical_dir.clone())?;
    let vector = RestVectorIndex::new(&config.services.vector, config.services.retry.clone())?;
    let mut retriever = HybridRetriever::new(
        lexical,
        vector,
        embedder,
        None,
        config.retrieval.fetch_multiplier,
        Arc::new(Metrics::new()),
    );
    let count = chunks.len();
    retriever.index(chunks).await?;

    println!("\n✅ Indexing completed successfully!");
    println!("📊 Indexed {count} chunks into {}", lexical_dir.display());
    println!(
        "📊 Upserted {count} vectors into collection '{}'",
        config.services.vector.collection
    );
    println!("\n💡 Ask a question with: cargo run --bin docqa-ask '<question>'");
    Ok(())
}
