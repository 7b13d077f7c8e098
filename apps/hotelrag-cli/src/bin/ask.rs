use std::env;
use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hotelrag_core::config::Config;
use hotelrag_engine::{build_engine, render_report, QueryOptions, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <question> [--no-generation] [--stream]", args[0]);
        eprintln!("Example: {} '套房空间大吗？'", args[0]);
        std::process::exit(1);
    }
    let question = &args[1];
    let enable_generation = !args.iter().any(|a| a == "--no-generation");
    let stream = args.iter().any(|a| a == "--stream");

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let cfg = config.settings()?;
    println!("🔍 hotelrag-ask\n==============");
    println!("Question: {}", question);
    let engine = Arc::new(build_engine(&cfg, &env::current_dir()?).await?);
    let options = QueryOptions { enable_generation };

    if stream {
        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            ctrl_c.cancel();
        });
        let mut rx = engine.query_stream(question, None, options, cancel)?;
        let mut out = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Intent { data } => println!("🧠 needs retrieval: {} | sub-queries: {}", data.needs_retrieval, data.sub_queries.len()),
                StreamEvent::References { data } => println!("🏆 {} evidence comments\n", data.comments.len()),
                StreamEvent::Chunk { content } => {
                    print!("{content}");
                    out.flush()?;
                }
                StreamEvent::Done { data } => println!("\n\n⏱️  total {} ms", data.timing.total_ms),
                StreamEvent::Error { message } => eprintln!("\n❌ {message}"),
            }
        }
        return Ok(());
    }

    let result = engine.query(question, None, options, &CancellationToken::new()).await?;
    println!("{}", render_report(&result));
    Ok(())
}
