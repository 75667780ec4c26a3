//! End-to-end scenarios over the in-process backend
//!
//! These drive the context builder and the processors the way the daemon
//! does: publish a trigger, watch the response subject and the KV
//! buckets, assert on provenance and workflow state.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use weaverd::builder::ContextBuilder;
use weaverd::bus::{MemoryBackend, StreamBackend};
use weaverd::config::{ContextConfig, StandardsConfig};
use weaverd::domain::{ContextBuildRequest, SourceType, TaskType, Urgency};
use weaverd::generate::PhaseGenerator;
use weaverd::graph::mock::StaticGraph;
use weaverd::llm::client::mock::MockLlmClient;
use weaverd::llm::{CompletionResponse, LlmClient};
use weaverd::processor::{Processor, ProcessorConfig};
use weaverd::processors::PhaseHooks;
use weaverd::workflow::{WorkflowState, WorkflowStore};

fn builder_over(graph: StaticGraph, root: &std::path::Path) -> (ContextBuilder, MemoryBackend) {
    let backend = MemoryBackend::new();
    let shared: Arc<dyn StreamBackend> = Arc::new(backend.clone());
    let builder = ContextBuilder::new(
        Arc::new(graph),
        shared,
        None,
        None,
        root,
        ContextConfig::default(),
        &StandardsConfig::default(),
    );
    (builder, backend)
}

async fn git(dir: &std::path::Path, args: &[&str]) {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .expect("git invocation failed");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Review with a large diff: clipped on file boundaries, flagged, and
/// within budget.
#[tokio::test]
async fn review_diff_truncates_at_file_boundaries() {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]).await;
    git(dir.path(), &["config", "user.email", "ci@example.com"]).await;
    git(dir.path(), &["config", "user.name", "ci"]).await;

    // Two committed files, both then rewritten, producing a diff well
    // over the 8000-token budget.
    for name in ["alpha.rs", "beta.rs"] {
        std::fs::write(dir.path().join(name), "fn original() {}\n").unwrap();
    }
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-q", "-m", "base"]).await;
    // Roughly 5.8k tokens of diff per file: one section fits the 8000
    // budget, two do not.
    for name in ["alpha.rs", "beta.rs"] {
        let body: String = (0..700).map(|i| format!("fn generated_{i}() {{ /* body */ }}\n")).collect();
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    let (builder, _) = builder_over(StaticGraph::new(), dir.path());
    let resp = builder
        .build(&ContextBuildRequest {
            request_id: "r-review".into(),
            task_type: TaskType::Review,
            git_ref: "HEAD".into(),
            token_budget: 8000,
            ..Default::default()
        })
        .await;

    assert!(resp.error.is_empty());
    assert!(resp.truncated);
    assert!(resp.tokens_used <= 8000);
    assert_eq!(resp.diffs.len(), 1);
    // Whole-file sections only: the kept diff ends cleanly, and only one
    // of the two files made the cut.
    assert_eq!(resp.diffs[0].matches("diff --git").count(), 1);
    let diff_entry = resp.provenance.iter().find(|p| p.source == "git_diff").unwrap();
    assert_eq!(diff_entry.source_type, SourceType::GitDiff);
}

/// Implementation with a missing spec entity: error response, no content.
#[tokio::test]
async fn implementation_missing_spec_is_error() {
    let dir = TempDir::new().unwrap();
    let (builder, _) = builder_over(StaticGraph::new(), dir.path());

    let resp = builder
        .build(&ContextBuildRequest {
            request_id: "r-impl".into(),
            task_type: TaskType::Implementation,
            spec_entity_id: "spec.X".into(),
            token_budget: 4000,
            ..Default::default()
        })
        .await;

    assert!(!resp.error.is_empty());
    assert!(resp.documents.is_empty());
    assert_eq!(resp.tokens_used, 0);
    assert_eq!(resp.tokens_budget, 4000);
}

/// Plan review in an empty workspace: the greenfield banner replaces the
/// file listing.
#[tokio::test]
async fn plan_review_greenfield_banner() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "target\n").unwrap();
    std::fs::create_dir_all(dir.path().join("sources")).unwrap();
    std::fs::write(dir.path().join("sources/seed.txt"), "vendored").unwrap();

    let (builder, _) = builder_over(StaticGraph::new(), dir.path());
    let resp = builder
        .build(&ContextBuildRequest {
            request_id: "r-pr".into(),
            task_type: TaskType::PlanReview,
            plan_content: "## Plan\ncreate src/lib.rs".into(),
            token_budget: 6000,
            ..Default::default()
        })
        .await;

    assert!(resp.error.is_empty());
    assert!(resp.documents["__file_tree__"].starts_with("GREENFIELD PROJECT"));
    let sources: Vec<&str> = resp.provenance.iter().map(|p| p.source.as_str()).collect();
    assert!(sources.contains(&"plan_content"));
    assert!(sources.contains(&"file_tree"));
}

/// Planning with nothing to go on: a blocking scope question.
#[tokio::test]
async fn planning_ambiguous_scope_blocks() {
    let dir = TempDir::new().unwrap();
    let (builder, _) = builder_over(StaticGraph::new(), dir.path());

    let resp = builder
        .build(&ContextBuildRequest {
            request_id: "r-plan".into(),
            task_type: TaskType::Planning,
            token_budget: 8000,
            ..Default::default()
        })
        .await;

    assert!(resp.insufficient_context);
    let scope = resp.questions.iter().find(|q| q.topic == "requirements.scope").unwrap();
    assert_eq!(scope.urgency, Urgency::Blocking);
}

/// Exploration under a roomy budget: tokens_used is exactly the sum of
/// the provenance entries, in allocation order.
#[tokio::test]
async fn exploration_provenance_sums_and_orders() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("README.md"), "# service\n".repeat(40)).unwrap();

    let graph = StaticGraph::new()
        .with_summary(&"the codebase summary ".repeat(100))
        .with_predicate("code.function", &["auth.login", "auth.logout", "auth.refresh"])
        .with_entity("auth.login", &"fn login() {}\n".repeat(80))
        .with_entity("auth.logout", &"fn logout() {}\n".repeat(80))
        .with_entity("auth.refresh", &"fn refresh() {}\n".repeat(80));

    let (builder, _) = builder_over(graph, dir.path());
    let resp = builder
        .build(&ContextBuildRequest {
            request_id: "r-exp".into(),
            task_type: TaskType::Exploration,
            topic: "auth".into(),
            token_budget: 10_000,
            ..Default::default()
        })
        .await;

    assert!(resp.error.is_empty());
    let total: usize = resp.provenance.iter().map(|p| p.tokens).sum();
    assert_eq!(resp.tokens_used, total);
    assert!(resp.tokens_used <= 10_000);

    // Summary first, then the three entities, then the doc.
    assert_eq!(resp.provenance[0].source, "codebase_summary");
    assert_eq!(resp.provenance[1].source, "entity:auth.login");
    for (i, entry) in resp.provenance.iter().enumerate() {
        assert_eq!(entry.priority, i);
    }
    assert_eq!(resp.provenance.len(), 5);
}

/// Phase generator over the bus: prose first, valid JSON on retry, state
/// advanced and the trigger acked exactly once.
#[tokio::test]
async fn phase_generator_retry_then_succeed() {
    let backend = MemoryBackend::new();
    let shared: Arc<dyn StreamBackend> = Arc::new(backend.clone());
    let dir = TempDir::new().unwrap();

    let valid = r#"```json
{"phases": [
  {"name": "Model", "description": "d", "depends_on": []},
  {"name": "API", "description": "d", "depends_on": [1]},
  {"name": "Tests", "description": "d", "depends_on": [1, 2]}
]}
```"#;
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(vec![
        CompletionResponse::text("Here are the phases in prose."),
        CompletionResponse::text(valid),
    ]));

    let builder = Arc::new(ContextBuilder::new(
        Arc::new(StaticGraph::new()),
        shared.clone(),
        None,
        None,
        dir.path(),
        ContextConfig::default(),
        &StandardsConfig::default(),
    ));
    let workflow = Arc::new(WorkflowStore::new(shared.kv_bucket("workflow-state", None).await.unwrap()));
    workflow.create("exec-1", &WorkflowState::new("Planning")).await.unwrap();

    let plans = Arc::new(weaverd::planning::memory::InMemoryPlanManager::new());
    let processor = Processor::new(
        PhaseHooks::new(
            builder,
            PhaseGenerator::new(llm, "planning"),
            shared.clone(),
            workflow.clone(),
            plans.clone(),
        ),
        shared.clone(),
        ProcessorConfig::new("WORKFLOW", "phase-generator", "phases.generate"),
    );
    processor.start().await.unwrap();

    let envelope = serde_json::json!({
        "type": {"domain": "planning", "category": "phase-trigger", "version": "1"},
        "payload": {
            "request_id": "r-ph",
            "slug": "auth",
            "title": "Auth",
            "prompt": "phase the auth work",
            "execution_id": "exec-1"
        },
        "source": "test"
    });
    backend
        .publish("phases.generate", serde_json::to_vec(&envelope).unwrap())
        .await
        .unwrap();

    // Wait for the state transition rather than sleeping blindly.
    let mut advanced = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Ok((state, _)) = workflow.read("exec-1").await
            && state.phase == "PhasesGenerated"
        {
            advanced = true;
            break;
        }
    }
    processor.stop().await.unwrap();

    assert!(advanced, "workflow never reached PhasesGenerated");
    let metrics = processor.metrics();
    assert_eq!(metrics.processed, 1);
    assert_eq!(metrics.succeeded, 1);
    assert!(backend.dead_letters("WORKFLOW", "phase-generator").await.is_empty());

    let (state, _) = workflow.read("exec-1").await.unwrap();
    let phases = &state.payload["phases"]["phases"];
    assert_eq!(phases.as_array().unwrap().len(), 3);
    // The plan manager saw the artifact too.
    assert_eq!(plans.get_phases("auth").unwrap().phases.len(), 3);
}
