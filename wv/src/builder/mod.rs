//! Context builder orchestration
//!
//! One `build` call runs the full pipeline: probe the graph, size the
//! budget, run the task-typed strategy, inject the standards preamble,
//! optionally block on Q&A, then assemble the response with ordered
//! provenance. The builder always returns a response object; failures
//! travel in its `error` field.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::budget::BudgetAllocation;
use crate::bus::StreamBackend;
use crate::config::{ContextConfig, StandardsConfig};
use crate::domain::{ContextBuildRequest, ContextBuildResponse, ProvenanceEntry, SourceType, keys};
use crate::gather::{FilesGatherer, GraphGatherer, StandardsGatherer, VcsGatherer};
use crate::graph::{GraphReadiness, KnowledgeGraph};
use crate::llm::CapabilityResolver;
use crate::qa::{QaIntegration, enrich};
use crate::strategy::{Sources, for_task_type};

mod calculator;

pub use calculator::BudgetCalculator;

/// Builds context responses for every task type
pub struct ContextBuilder {
    graph: Arc<dyn KnowledgeGraph>,
    readiness: GraphReadiness,
    backend: Arc<dyn StreamBackend>,
    calculator: BudgetCalculator,
    standards: StandardsGatherer,
    qa: Option<QaIntegration>,
    root: PathBuf,
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(
        graph: Arc<dyn KnowledgeGraph>,
        backend: Arc<dyn StreamBackend>,
        resolver: Option<Arc<dyn CapabilityResolver>>,
        qa: Option<QaIntegration>,
        root: impl Into<PathBuf>,
        config: ContextConfig,
        standards_config: &StandardsConfig,
    ) -> Self {
        let root = root.into();
        let standards = StandardsGatherer::new(
            crate::gather::standards_path(&root, &standards_config.path),
            standards_config.max_tokens,
        );
        Self {
            readiness: GraphReadiness::new(Duration::from_millis(config.graph_readiness_ms)),
            calculator: BudgetCalculator::new(config.default_token_budget, config.headroom_tokens, resolver),
            graph,
            backend,
            standards,
            qa,
            root,
            config,
        }
    }

    /// Build a context; never fails, the response carries any error
    pub async fn build(&self, req: &ContextBuildRequest) -> ContextBuildResponse {
        let budget_total = self.calculator.calculate(req);

        if let Err(e) = req.validate() {
            return ContextBuildResponse::failed(req, budget_total, e.to_string());
        }

        // 1. Graph readiness; failure degrades, it does not abort.
        let graph_ready = self.readiness.ensure_ready(&self.graph).await;

        // 2-3. Fresh allocation, strategy dispatch.
        let mut budget = BudgetAllocation::new(budget_total);
        let sources = Sources {
            graph: GraphGatherer::new(self.graph.clone()),
            files: FilesGatherer::new(&self.root),
            vcs: VcsGatherer::new(&self.root),
            graph_ready,
        };
        let strategy = for_task_type(req.task_type);
        let strategy_deadline = Duration::from_millis(self.config.context_timeout_ms);
        let mut result = match tokio::time::timeout(strategy_deadline, strategy.build(req, &mut budget, &sources)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %req.request_id, "strategy run exceeded {strategy_deadline:?}");
                return ContextBuildResponse::failed(
                    req,
                    budget_total,
                    format!("context build timed out after {strategy_deadline:?}"),
                );
            }
        };

        // 4. A strategy error short-circuits with no content.
        if !result.error.is_empty() {
            info!(request_id = %req.request_id, error = %result.error, "strategy could not build context");
            return ContextBuildResponse::failed(req, budget_total, result.error);
        }

        // 5. Standards preamble; charged to its own budget, not the
        // strategy's.
        let preamble = self.standards.preamble().await;
        if !preamble.is_empty() {
            result.documents.insert(keys::STANDARDS.to_string(), preamble.content);
            result.sop_ids = preamble.sop_ids;
            result.sop_requirements = preamble.requirements;
        }

        // 6. Q&A when the strategy came up short.
        if result.insufficient_context
            && !result.questions.is_empty()
            && let Some(qa) = &self.qa
        {
            let answers = qa
                .handle_insufficient_context(&result.questions, &req.workflow_id, &req.plan_slug)
                .await;
            enrich(&mut result, &answers);
        }

        // 7. Provenance mirrors allocation order.
        let provenance: Vec<ProvenanceEntry> = budget
            .ordered_items()
            .into_iter()
            .enumerate()
            .map(|(priority, (source, tokens))| ProvenanceEntry {
                source_type: SourceType::from_source_name(&source),
                source,
                tokens,
                priority,
            })
            .collect();

        debug!(request_id = %req.request_id, "{}", budget.summary());

        ContextBuildResponse {
            request_id: req.request_id.clone(),
            task_type: Some(req.task_type),
            workflow_id: req.workflow_id.clone(),
            entities: result.entities,
            documents: result.documents,
            diffs: result.diffs,
            provenance,
            sop_ids: result.sop_ids,
            sop_requirements: result.sop_requirements,
            questions: result.questions,
            insufficient_context: result.insufficient_context,
            tokens_used: budget.allocated(),
            tokens_budget: budget_total,
            truncated: result.truncated,
            error: String::new(),
        }
    }

    /// Publish a response on the per-request subject and mirror it to the
    /// response bucket
    ///
    /// The KV write is best-effort; only a publish failure fails the
    /// request.
    pub async fn publish(&self, req: &ContextBuildRequest, response: &ContextBuildResponse) -> Result<()> {
        let payload = serde_json::to_vec(response).context("Failed to serialize context response")?;

        let subject = format!("{}.{}", self.config.output_subject_prefix, req.request_id);
        self.backend
            .publish(&subject, payload.clone())
            .await
            .context("Failed to publish context response")?;

        let ttl = Duration::from_secs(self.config.response_ttl_hours * 3600);
        match self.backend.kv_bucket(&self.config.response_bucket, Some(ttl)).await {
            Ok(bucket) => {
                if let Err(e) = bucket.put(&req.request_id, payload).await {
                    warn!(request_id = %req.request_id, error = %e, "response KV write failed");
                }
            }
            Err(e) => warn!(error = %e, "response bucket unavailable"),
        }

        Ok(())
    }

    /// Build and immediately publish, for one-shot callers
    pub async fn build_and_publish(&self, req: &ContextBuildRequest) -> Result<ContextBuildResponse> {
        let response = self.build(req).await;
        self.publish(req, &response).await?;
        Ok(response)
    }
}
