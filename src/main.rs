//! `WuffChat` console - drives the conversation engine from stdin
//!
//! Each input line is one user turn on a single session. Replies go to
//! stdout, structured logs to stderr.

use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wuffchat_engine::db::Database;
use wuffchat_engine::handlers::HandlerRegistry;
use wuffchat_engine::services::{
    Collections, FeedbackSink, MemoryFeedbackSink, OpenAiTextGenerator, PromptCatalog,
    ServiceBundle, SqliteFeedbackSink, WeaviateSearch,
};
use wuffchat_engine::session::{
    FallbackSessionStore, MemorySessionStore, SessionStore, SqliteSessionStore,
};
use wuffchat_engine::{EngineConfig, FlowDefinition, Orchestrator};

const DEFAULT_WEAVIATE_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wuffchat_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = EngineConfig::from_env()?;

    // Session store and feedback sink
    let (store, feedback): (Arc<dyn SessionStore>, Arc<dyn FeedbackSink>) = match &config.db_path
    {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "Opening database");
            let db = Database::open(path)?;
            let purged = db.purge_expired(Utc::now())?;
            if purged > 0 {
                tracing::info!(purged, "Removed expired rows");
            }
            (
                Arc::new(FallbackSessionStore::new(Arc::new(SqliteSessionStore::new(
                    db.clone(),
                )))),
                Arc::new(SqliteFeedbackSink::new(db)),
            )
        }
        None => {
            tracing::warn!("WUFF_DB_PATH not set, sessions and feedback stay in memory");
            (
                Arc::new(MemorySessionStore::new()),
                Arc::new(MemoryFeedbackSink::new()),
            )
        }
    };

    // Collaborators
    let api_key = config.openai.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("No OpenAI API key configured. Set OPENAI_API_KEY.");
        String::new()
    });
    let text = OpenAiTextGenerator::new(
        api_key,
        config.openai.model.clone(),
        config.openai.base_url.as_deref(),
        config.handler.generation.temperature,
        config.call_timeout,
    )?;

    let collections = &config.handler.collections;
    let weaviate_url = config.weaviate.url.clone().unwrap_or_else(|| {
        tracing::warn!(url = DEFAULT_WEAVIATE_URL, "WEAVIATE_URL not set, using default");
        DEFAULT_WEAVIATE_URL.to_string()
    });
    let search = WeaviateSearch::new(
        &weaviate_url,
        config.weaviate.api_key.clone(),
        config.call_timeout,
    )?
    .with_collection(&collections.symptoms, Collections::SYMPTOM_PROPERTIES)
    .with_collection(&collections.instincts, Collections::INSTINCT_PROPERTIES)
    .with_collection(&collections.exercises, Collections::EXERCISE_PROPERTIES);

    tracing::info!(path = %config.prompts_path.display(), "Loading prompt catalog");
    let prompts = PromptCatalog::load(&config.prompts_path)?;

    let flow = match &config.flow_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading flow table");
            FlowDefinition::from_json(&std::fs::read_to_string(path)?)?
        }
        None => FlowDefinition::standard()?,
    };

    let services = ServiceBundle::new(Arc::new(text), Arc::new(search), Arc::new(prompts), feedback)
        .with_call_timeout(config.call_timeout)
        .with_settings(config.handler.clone());

    let orchestrator = Orchestrator::new(flow, HandlerRegistry::standard(), services, store)?
        .with_policy(config.turn_policy)
        .with_ttls(config.session_ttl, config.ended_ttl);

    tracing::info!(
        model = %config.openai.model,
        policy = ?config.turn_policy,
        "WuffChat engine ready"
    );

    // Console loop
    let opening = orchestrator.start_session().await;
    print_reply(&opening.messages);
    let session_id = opening.session_id;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = orchestrator.process_turn(Some(&session_id), &line).await;
        print_reply(&reply.messages);
        if reply.ended {
            break;
        }
    }

    Ok(())
}

fn print_reply(messages: &[String]) {
    for message in messages {
        println!("{message}\n");
    }
}
