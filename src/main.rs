use std::sync::Arc;

use inbox_pilot::config::PipelineConfig;
use inbox_pilot::llm::{LlmBackend, LlmConfig, create_provider};
use inbox_pilot::mail::GmailClient;
use inbox_pilot::pipeline::{Oracle, PipelineRunner, TriggerEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let thread_id = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: inbox-pilot <thread_id>");
        eprintln!("  Processes one inbox thread through the pipeline.");
        std::process::exit(1);
    });

    let gmail_token = std::env::var("GMAIL_ACCESS_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: GMAIL_ACCESS_TOKEN not set");
        std::process::exit(1);
    });

    // Prefer Anthropic, fall back to OpenAI, by whichever key is present.
    let (backend, api_key) = if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        (LlmBackend::Anthropic, key)
    } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        (LlmBackend::OpenAi, key)
    } else {
        eprintln!("Error: neither ANTHROPIC_API_KEY nor OPENAI_API_KEY is set");
        std::process::exit(1);
    };

    let model = std::env::var("INBOX_PILOT_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;

    let provider = Arc::new(GmailClient::new(secrecy::SecretString::from(gmail_token))?);
    let config = PipelineConfig::from_env()?;
    let runner = PipelineRunner::new(provider, Oracle::new(llm), config);

    let report = runner.run(&TriggerEvent { thread_id }).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
