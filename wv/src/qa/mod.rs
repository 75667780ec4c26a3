//! Q&A blocking protocol
//!
//! When a strategy reports insufficient context, its questions are
//! materialized as persistent workflow questions, routed to answerers,
//! and waited on for a bounded time. Answers arrive through a KV watch
//! per question, or through a subject subscription when the bucket is
//! unavailable. Whatever arrives in time is folded back into the
//! strategy result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{BusError, StreamBackend};
use crate::config::QaConfig;
use crate::domain::{Question, StrategyResult, keys};

/// Pull wait used by the subscription fallback
const FALLBACK_PULL_WAIT: Duration = Duration::from_secs(5);

/// A question persisted for answerers to pick up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowQuestion {
    pub id: String,
    pub topic: String,
    pub question: String,
    pub context: String,
    pub urgency: String,
    pub loop_id: String,
    pub plan_slug: String,
    pub created_at: DateTime<Utc>,
}

/// An answer read back from the answer bucket or subject
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerRecord {
    pub answer: String,
    pub answered_by: String,
    #[serde(rename = "type")]
    pub answer_type: String,
}

/// The outcome for one asked question
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub question: Question,
    pub answer: String,
    pub answered: bool,
    pub source: String,
}

/// Routes a persisted question toward whoever can answer it
#[async_trait]
pub trait AnswerRouter: Send + Sync {
    async fn route(&self, question: &WorkflowQuestion) -> Result<(), BusError>;
}

/// Answerer routing table, loaded from the answerers config file
///
/// Keys are topic prefixes; values are the subjects questions under that
/// prefix go to. Topics with no entry fall back to the default subject
/// scheme.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnswererRoutes {
    pub routes: HashMap<String, String>,
}

impl AnswererRoutes {
    /// Load from YAML; missing or malformed files mean an empty table
    pub async fn load(path: &std::path::Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "answerers config malformed, ignoring");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Longest-prefix match over the table
    fn subject_for(&self, topic: &str) -> Option<&str> {
        self.routes
            .iter()
            .filter(|(prefix, _)| topic.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, subject)| subject.as_str())
    }
}

/// Default router: the answerers table first, then
/// `<prefix>.<urgency>.<topic>`
pub struct SubjectAnswerRouter {
    backend: Arc<dyn StreamBackend>,
    subject_prefix: String,
    routes: AnswererRoutes,
}

impl SubjectAnswerRouter {
    pub fn new(backend: Arc<dyn StreamBackend>, subject_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            subject_prefix: subject_prefix.into(),
            routes: AnswererRoutes::default(),
        }
    }

    pub fn with_routes(mut self, routes: AnswererRoutes) -> Self {
        self.routes = routes;
        self
    }

    /// Construct with the routing table from the config path
    pub async fn from_config(backend: Arc<dyn StreamBackend>, config: &QaConfig) -> Self {
        let routes = AnswererRoutes::load(&config.answerers_config_path).await;
        Self::new(backend, config.question_subject_prefix.clone()).with_routes(routes)
    }
}

#[async_trait]
impl AnswerRouter for SubjectAnswerRouter {
    async fn route(&self, question: &WorkflowQuestion) -> Result<(), BusError> {
        let subject = match self.routes.subject_for(&question.topic) {
            Some(subject) => subject.to_string(),
            None => format!("{}.{}.{}", self.subject_prefix, question.urgency, question.topic),
        };
        let payload = serde_json::to_vec(question)?;
        self.backend.publish(&subject, payload).await
    }
}

/// Creates questions and waits for their answers
pub struct QaIntegration {
    backend: Arc<dyn StreamBackend>,
    router: Arc<dyn AnswerRouter>,
    config: QaConfig,
}

impl QaIntegration {
    pub fn new(backend: Arc<dyn StreamBackend>, router: Arc<dyn AnswerRouter>, config: QaConfig) -> Self {
        Self {
            backend,
            router,
            config,
        }
    }

    /// Ask the given questions and wait up to the blocking timeout
    ///
    /// With blocking disabled, returns every question unanswered without
    /// asking anything.
    pub async fn handle_insufficient_context(
        &self,
        questions: &[Question],
        loop_id: &str,
        plan_slug: &str,
    ) -> Vec<AnsweredQuestion> {
        if !self.config.allow_blocking {
            debug!("blocking disabled; returning questions unanswered");
            return questions
                .iter()
                .map(|q| AnsweredQuestion {
                    question: q.clone(),
                    answer: String::new(),
                    answered: false,
                    source: String::new(),
                })
                .collect();
        }

        // Persist and route; failures drop the question with a warning.
        let mut created: Vec<(WorkflowQuestion, Question)> = Vec::new();
        for question in questions {
            let wq = WorkflowQuestion {
                id: format!("q-{}", Uuid::new_v4()),
                topic: question.topic.clone(),
                question: question.question.clone(),
                context: question.context.clone(),
                urgency: question.urgency.as_str().to_string(),
                loop_id: loop_id.to_string(),
                plan_slug: plan_slug.to_string(),
                created_at: Utc::now(),
            };
            if let Err(e) = self.persist(&wq).await {
                warn!(topic = %wq.topic, error = %e, "failed to persist question, dropping");
                continue;
            }
            if let Err(e) = self.router.route(&wq).await {
                warn!(topic = %wq.topic, error = %e, "failed to route question, dropping");
                continue;
            }
            created.push((wq, question.clone()));
        }

        let timeout = Duration::from_secs(self.config.blocking_timeout_secs);
        let answers = match self.wait_via_kv(&created, timeout).await {
            Ok(answers) => answers,
            Err(e) => {
                warn!(error = %e, "answer bucket unavailable, falling back to subject subscription");
                self.wait_via_subjects(&created, timeout).await
            }
        };

        // Map answers back to the original questions by topic.
        created
            .into_iter()
            .map(|(wq, question)| match answers.get(&wq.id) {
                Some(record) => AnsweredQuestion {
                    question,
                    answer: record.answer.clone(),
                    answered: true,
                    source: record.answered_by.clone(),
                },
                None => AnsweredQuestion {
                    question,
                    answer: String::new(),
                    answered: false,
                    source: String::new(),
                },
            })
            .collect()
    }

    async fn persist(&self, question: &WorkflowQuestion) -> Result<(), BusError> {
        let bucket = self.backend.kv_bucket("workflow-questions", None).await?;
        bucket.put(&question.id, serde_json::to_vec(question)?).await?;
        Ok(())
    }

    /// Primary adapter: one KV watcher per created question
    async fn wait_via_kv(
        &self,
        created: &[(WorkflowQuestion, Question)],
        timeout: Duration,
    ) -> Result<HashMap<String, AnswerRecord>, BusError> {
        let bucket = self.backend.kv_bucket(&self.config.answer_bucket, None).await?;
        let answers: Arc<Mutex<HashMap<String, AnswerRecord>>> = Arc::new(Mutex::new(HashMap::new()));

        let mut watchers = JoinSet::new();
        for (wq, _) in created {
            let mut watcher = bucket.watch(&wq.id).await?;

            // An answer may have landed between routing and the watch
            // registration; a direct read closes that window.
            if let Ok(Some(entry)) = bucket.get(&wq.id).await
                && let Ok(record) = serde_json::from_slice::<AnswerRecord>(&entry.value)
            {
                answers.lock().await.insert(wq.id.clone(), record);
                watcher.stop();
                continue;
            }

            let id = wq.id.clone();
            let answers = answers.clone();
            watchers.spawn(async move {
                // One update is one answer; the task ends either way.
                if let Ok(Some(entry)) = watcher.next(timeout).await
                    && let Ok(record) = serde_json::from_slice::<AnswerRecord>(&entry.value)
                {
                    answers.lock().await.insert(id, record);
                }
                watcher.stop();
            });
        }

        // Wait for every watcher or the deadline; unfinished watchers are
        // aborted when the set drops.
        let _ = tokio::time::timeout(timeout, async {
            while watchers.join_next().await.is_some() {}
        })
        .await;

        let map = answers.lock().await.clone();
        Ok(map)
    }

    /// Fallback adapter: subscribe to the per-question answer subjects
    async fn wait_via_subjects(
        &self,
        created: &[(WorkflowQuestion, Question)],
        timeout: Duration,
    ) -> HashMap<String, AnswerRecord> {
        let mut answers = HashMap::new();
        if created.is_empty() {
            return answers;
        }

        let filter = format!("{}.>", self.config.answer_subject_prefix);
        let mut sub = match self.backend.subscribe(&filter).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "answer subscription failed");
                return answers;
            }
        };

        let wanted: HashMap<String, String> = created
            .iter()
            .map(|(wq, _)| (format!("{}.{}", self.config.answer_subject_prefix, wq.id), wq.id.clone()))
            .collect();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut remaining = created.len();
        while remaining > 0 && tokio::time::Instant::now() < deadline {
            let wait = FALLBACK_PULL_WAIT.min(deadline.saturating_duration_since(tokio::time::Instant::now()));
            match sub.next(wait).await {
                Ok(Some(payload)) => {
                    let Ok(envelope) = serde_json::from_slice::<AnswerEnvelope>(&payload) else {
                        continue;
                    };
                    let Some(id) = wanted.get(&format!(
                        "{}.{}",
                        self.config.answer_subject_prefix, envelope.question_id
                    )) else {
                        continue;
                    };
                    answers.insert(id.clone(), envelope.record);
                    remaining -= 1;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "answer subscription closed");
                    break;
                }
            }
        }

        answers
    }
}

/// Wire shape of an answer published on a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub question_id: String,
    #[serde(flatten)]
    pub record: AnswerRecord,
}

/// Fold answered questions back into a strategy result
///
/// Each answered entry becomes a `__qa_answer__<topic>_<index>` document;
/// answered topics leave the question list, and the insufficiency flag
/// clears once no questions remain.
pub fn enrich(result: &mut StrategyResult, answers: &[AnsweredQuestion]) {
    for (index, answered) in answers.iter().enumerate() {
        if !answered.answered {
            continue;
        }
        let body = format!(
            "Q: {}\nA: {}\n(answered by {})",
            answered.question.question, answered.answer, answered.source
        );
        result
            .documents
            .insert(keys::qa_answer(&answered.question.topic, index), body);
        result.questions.retain(|q| q.topic != answered.question.topic);
    }
    if result.questions.is_empty() {
        result.insufficient_context = false;
    }
}
