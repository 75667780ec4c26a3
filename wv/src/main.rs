//! Weaverd CLI entry point

use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use weaverd::bus::{MemoryBackend, StreamBackend};
use weaverd::cli::{Cli, Command};
use weaverd::config::Config;
use weaverd::domain::ContextBuildRequest;
use weaverd::generate::{PhaseGenerator, TaskGenerator};
use weaverd::graph::KnowledgeGraph;
use weaverd::graph::mock::StaticGraph;
use weaverd::llm::{AnthropicClient, CapabilityResolver, ConfigCapabilityResolver, LlmClient};
use weaverd::planning::{PlanCoordinator, memory::InMemoryPlanManager};
use weaverd::processor::{Processor, ProcessorConfig};
use weaverd::processors::{ContextHooks, PhaseHooks, PlanHooks, TaskHooks};
use weaverd::qa::{QaIntegration, SubjectAnswerRouter};
use weaverd::ContextBuilder;
use weaverd::workflow::WorkflowStore;

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Daemon) | None => run_daemon(config).await,
        Some(Command::Context { request, root }) => run_context(config, request, root).await,
        Some(Command::Config) => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

async fn make_builder(
    config: &Config,
    backend: Arc<dyn StreamBackend>,
    graph: Arc<dyn KnowledgeGraph>,
    root: std::path::PathBuf,
    with_qa: bool,
) -> Arc<ContextBuilder> {
    let resolver: Arc<dyn CapabilityResolver> = Arc::new(ConfigCapabilityResolver::new(
        config.llm.capabilities.clone(),
        config.llm.model_limits.clone(),
    ));
    let qa = if with_qa {
        let router = Arc::new(SubjectAnswerRouter::from_config(backend.clone(), &config.qa).await);
        Some(QaIntegration::new(backend.clone(), router, config.qa.clone()))
    } else {
        None
    };
    Arc::new(ContextBuilder::new(
        graph,
        backend,
        Some(resolver),
        qa,
        root,
        config.context.clone(),
        &config.standards,
    ))
}

/// Run every processor over the in-process backend until interrupted
///
/// Broker- and graph-backed deployments swap the two collaborators here;
/// everything downstream only sees the traits.
async fn run_daemon(config: Config) -> Result<()> {
    let backend: Arc<dyn StreamBackend> = Arc::new(MemoryBackend::new());
    let graph: Arc<dyn KnowledgeGraph> = Arc::new(StaticGraph::new());
    let root = std::env::current_dir().context("Failed to resolve working directory")?;

    let llm: Arc<dyn LlmClient> =
        Arc::new(AnthropicClient::from_config(&config.llm).context("Failed to construct LLM client")?);

    let builder = make_builder(&config, backend.clone(), graph, root, true).await;
    let workflow = Arc::new(WorkflowStore::new(backend.kv_bucket("workflow-state", None).await?));
    let plans = Arc::new(InMemoryPlanManager::new());

    let capability = config.context.default_capability.clone();
    let coordinator = Arc::new(PlanCoordinator::new(
        llm.clone(),
        builder.clone(),
        plans.clone(),
        config.planner.clone(),
        capability.clone(),
    ));

    // Context builds are quick; planner and generator work holds a
    // message through several LLM round trips.
    let short_ack = std::time::Duration::from_secs(60);
    let long_ack = std::time::Duration::from_secs(300);

    let context_processor = Processor::new(
        ContextHooks::new(builder.clone()),
        backend.clone(),
        ProcessorConfig::new(&config.context.stream, &config.context.consumer, &config.context.subject)
            .with_ack_wait(short_ack),
    );
    let plan_processor = Processor::new(
        PlanHooks::new(coordinator, backend.clone(), workflow.clone()),
        backend.clone(),
        ProcessorConfig::new(&config.context.stream, "plan-coordinator", "plan.generate").with_ack_wait(long_ack),
    );
    let phase_processor = Processor::new(
        PhaseHooks::new(
            builder.clone(),
            PhaseGenerator::new(llm.clone(), capability.clone()),
            backend.clone(),
            workflow.clone(),
            plans.clone(),
        ),
        backend.clone(),
        ProcessorConfig::new(&config.context.stream, "phase-generator", "phases.generate").with_ack_wait(long_ack),
    );
    let task_processor = Processor::new(
        TaskHooks::new(
            builder,
            TaskGenerator::new(llm, capability),
            backend.clone(),
            workflow,
            plans,
        ),
        backend.clone(),
        ProcessorConfig::new(&config.context.stream, "task-generator", "tasks.generate").with_ack_wait(long_ack),
    );

    context_processor.start().await?;
    plan_processor.start().await?;
    phase_processor.start().await?;
    task_processor.start().await?;
    info!("weaverd running; ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("shutting down");

    task_processor.stop().await?;
    phase_processor.stop().await?;
    plan_processor.stop().await?;
    context_processor.stop().await?;
    Ok(())
}

/// One-shot: build a context from a request file and print the response
async fn run_context(config: Config, request_path: std::path::PathBuf, root: std::path::PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&request_path)
        .context(format!("Failed to read request from {}", request_path.display()))?;
    let request: ContextBuildRequest = serde_json::from_str(&raw).context("Failed to parse request JSON")?;

    let backend: Arc<dyn StreamBackend> = Arc::new(MemoryBackend::new());
    let graph: Arc<dyn KnowledgeGraph> = Arc::new(StaticGraph::new());
    let builder = make_builder(&config, backend, graph, root, false).await;

    let response = builder.build(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
