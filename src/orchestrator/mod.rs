//! Run orchestration: claim, generate, publish, archive, finalize
//!
//! One run moves a single work item through its lifecycle:
//!
//! ```text
//! Claiming -> Generating -> Publishing -> Archiving -> Finalizing
//! ```
//!
//! Failure handling is deliberately uneven across the steps:
//!
//! - no pending item or a lost claim race ends the run as a quiet no-op
//! - text generation failure is fatal for the run
//! - image generation failure degrades the run to a text-only post
//! - channel publishes are attempted independently and aggregated; the run
//!   is published if at least one channel succeeded
//! - archive failures never affect the run result
//! - a failed finalize writeback is surfaced in the outcome alongside the
//!   in-memory result
//!
//! Errors never unwind out of [`Orchestrator::run`]; callers always receive
//! a structured [`RunOutcome`].

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::{ArchiveEntry, VectorArchive};
use crate::cache::{request_key, TtlCache};
use crate::config::{render_prompt, Config};
use crate::generator::{canonical_name, ContentGenerator};
use crate::models::{
    GenerationResult, PublishOutcome, RunOutcome, RunStatus, RunSummary, ScheduleDefinition,
    WorkItem, WorkItemStatus,
};
use crate::publisher::ChannelPublisher;
use crate::source::{ClaimError, ContentSource};

/// Parameters of one run, derived from the triggering schedule.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Schedule id, or "immediate" for manual runs
    pub schedule_id: String,

    /// Restrict publishing to this channel when set
    pub module: Option<String>,

    /// Prompt template key (overridable per item)
    pub prompt_key: String,

    /// Configured generator name, aliases allowed
    pub generator: String,
}

impl RunContext {
    /// Context for a run triggered by a schedule definition.
    pub fn from_schedule(definition: &ScheduleDefinition) -> Self {
        Self {
            schedule_id: definition.id.clone(),
            module: definition.module.clone(),
            prompt_key: definition.prompt_key.clone(),
            generator: definition.generator.clone(),
        }
    }

    /// Context for a manual run not tied to any schedule.
    pub fn immediate(config: &Config) -> Self {
        Self {
            schedule_id: "immediate".to_string(),
            module: None,
            prompt_key: config.default_prompt_key.clone(),
            generator: "openai".to_string(),
        }
    }
}

/// Coordinates one work item through the full pipeline.
pub struct Orchestrator {
    source: Arc<dyn ContentSource>,
    generators: HashMap<&'static str, Arc<dyn ContentGenerator>>,
    image_provider: Option<(Arc<dyn ContentGenerator>, String)>,
    publishers: Vec<Arc<dyn ChannelPublisher>>,
    archive: Option<Arc<dyn VectorArchive>>,
    cache: Arc<TtlCache<String, GenerationResult>>,
    config: Arc<Config>,
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    source: Option<Arc<dyn ContentSource>>,
    generators: HashMap<&'static str, Arc<dyn ContentGenerator>>,
    image_provider: Option<(Arc<dyn ContentGenerator>, String)>,
    publishers: Vec<Arc<dyn ChannelPublisher>>,
    archive: Option<Arc<dyn VectorArchive>>,
    cache: Option<Arc<TtlCache<String, GenerationResult>>>,
    config: Option<Arc<Config>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Register a text generator under its canonical name.
    pub fn generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generators.insert(generator.name(), generator);
        self
    }

    /// Use this provider and model for illustrations.
    pub fn image_provider(mut self, provider: Arc<dyn ContentGenerator>, model: String) -> Self {
        self.image_provider = Some((provider, model));
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn ChannelPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn VectorArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn cache(mut self, cache: Arc<TtlCache<String, GenerationResult>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> anyhow::Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(TtlCache::new(
                config.cache.maxsize,
                std::time::Duration::from_secs(config.cache.ttl_secs),
            ))
        });

        Ok(Orchestrator {
            source: self
                .source
                .ok_or_else(|| anyhow::anyhow!("orchestrator requires a content source"))?,
            generators: self.generators,
            image_provider: self.image_provider,
            publishers: self.publishers,
            archive: self.archive,
            cache,
            config,
        })
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Execute one run end to end.
    pub async fn run(&self, ctx: &RunContext) -> RunOutcome {
        tracing::info!(schedule = %ctx.schedule_id, "Run started");

        // Claiming
        let item = match self.source.claim_next_pending().await {
            Ok(item) => item,
            Err(e) if e.is_no_op() => {
                tracing::debug!(schedule = %ctx.schedule_id, reason = %e, "Nothing to do");
                return RunOutcome::skipped(&ctx.schedule_id);
            }
            Err(ClaimError::Source { reason }) => {
                tracing::error!(schedule = %ctx.schedule_id, %reason, "Claim failed");
                return self.failed(ctx, None, format!("claim: {reason}"));
            }
            Err(e) => return self.failed(ctx, None, e.to_string()),
        };
        tracing::info!(row = item.row, idea = %item.idea, "Claimed work item");

        if item.idea.trim().is_empty() {
            return self
                .fail_item(ctx, &item, "empty idea".to_string(), None)
                .await;
        }

        // Generating
        let provider = match canonical_name(&ctx.generator) {
            Ok(name) => name,
            Err(e) => return self.fail_item(ctx, &item, e.to_string(), None).await,
        };
        let generator = match self.generators.get(provider) {
            Some(generator) => Arc::clone(generator),
            None => {
                return self
                    .fail_item(ctx, &item, format!("generator '{provider}' not configured"), None)
                    .await
            }
        };

        let mut degraded = Vec::new();
        let example = self.style_example(ctx, &mut degraded).await;

        let prompt_key = item.prompt_key.as_deref().unwrap_or(&ctx.prompt_key);
        let template = match self
            .config
            .prompt_template(prompt_key, ctx.module.as_deref())
        {
            Some(template) => template,
            None => {
                return self
                    .fail_item(
                        ctx,
                        &item,
                        format!("prompt template '{prompt_key}' not found"),
                        None,
                    )
                    .await
            }
        };
        let prompt = render_prompt(template, &item.idea, &example);

        let params = self.config.generation_params(provider);
        let key = request_key(provider, &params.model, params.temperature, &prompt);

        let generation = match self.cache.get(&key) {
            Some(cached) => {
                tracing::debug!(row = item.row, "Generation served from cache");
                if self.image_provider.is_some() && cached.image.is_none() {
                    degraded.push("image: cached text-only result reused".to_string());
                }
                cached
            }
            None => {
                let text = match generator.generate_text(&prompt, &params).await {
                    Ok(text) => text,
                    Err(e) => {
                        return self.fail_item(ctx, &item, e.to_string(), Some(&params.model)).await
                    }
                };

                let image = match &self.image_provider {
                    Some((provider, model)) => {
                        match provider.generate_image(&item.idea, model).await {
                            Ok(image) => Some(image),
                            Err(e) => {
                                tracing::warn!(row = item.row, error = %e, "Image generation failed; posting text only");
                                degraded.push(format!("image: {e}"));
                                None
                            }
                        }
                    }
                    None => None,
                };

                let result = GenerationResult {
                    text: text.text,
                    image,
                    provider: provider.to_string(),
                    model: params.model.clone(),
                    temperature: params.temperature,
                    tokens: text.tokens,
                    cost: text.cost,
                };
                self.cache.put(key, result.clone());
                result
            }
        };

        // Publishing
        let targets = self.active_publishers(ctx, &item);
        if targets.is_empty() {
            return self
                .fail_item(ctx, &item, "no enabled channels".to_string(), Some(&generation.model))
                .await;
        }

        let attempts = targets.iter().map(|publisher| {
            let publisher = Arc::clone(publisher);
            let text = generation.text.clone();
            let image = generation.image.clone();
            async move {
                match publisher.publish(&text, image.as_ref()).await {
                    Ok(post_id) => PublishOutcome::ok(publisher.channel(), post_id),
                    Err(e) => {
                        tracing::warn!(channel = publisher.channel(), error = %e, "Publish failed");
                        PublishOutcome::failed(publisher.channel(), e.reason)
                    }
                }
            }
        });
        let outcomes: Vec<PublishOutcome> = join_all(attempts).await;

        let published = outcomes.iter().any(|o| o.success);
        let status = if published {
            RunStatus::Published
        } else {
            RunStatus::Failed
        };

        // Archiving
        if published {
            self.archive_outcomes(&generation, &outcomes, &mut degraded)
                .await;
        }

        // Finalizing
        let url = outcomes
            .iter()
            .find(|o| o.success)
            .and_then(|o| o.post_id.clone());
        let error = if published {
            None
        } else {
            Some(combined_errors(&outcomes))
        };
        let summary = RunSummary {
            status: if published {
                WorkItemStatus::Published
            } else {
                WorkItemStatus::Failed
            },
            completed_at: chrono::Utc::now(),
            url: url.clone(),
            generator: generation.provider.clone(),
            model: generation.model.clone(),
            notes: match &error {
                Some(error) => error.clone(),
                None => generation.notes(),
            },
        };
        let finalize_error = self.finalize(&item, &summary).await;

        let outcome = RunOutcome {
            schedule_id: ctx.schedule_id.clone(),
            status,
            row: Some(item.row),
            outcomes,
            degraded,
            error,
            finalize_error,
        };
        tracing::info!(
            schedule = %ctx.schedule_id,
            row = item.row,
            status = ?outcome.status,
            degraded = outcome.degraded.len(),
            "Run finished"
        );
        outcome
    }

    /// Fetch a recent post for the target channel as a style example.
    ///
    /// Best-effort: any failure degrades to an empty example.
    async fn style_example(&self, ctx: &RunContext, degraded: &mut Vec<String>) -> String {
        let Some(archive) = &self.archive else {
            return String::new();
        };
        let channel = match ctx.module.as_deref() {
            Some(module) => module.to_string(),
            None => match self.config.enabled_channels().first() {
                Some(channel) => channel.to_string(),
                None => return String::new(),
            },
        };

        match archive.last_for_channel(&channel).await {
            Ok(Some(example)) => example,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Style example lookup failed");
                degraded.push(format!("example: {e}"));
                String::new()
            }
        }
    }

    /// Publishers participating in this run.
    ///
    /// The schedule's module restriction and the item's channel list both
    /// narrow the configured set.
    fn active_publishers(
        &self,
        ctx: &RunContext,
        item: &WorkItem,
    ) -> Vec<Arc<dyn ChannelPublisher>> {
        self.publishers
            .iter()
            .filter(|p| match ctx.module.as_deref() {
                Some(module) => p.channel() == module,
                None => true,
            })
            .filter(|p| match &item.channels {
                Some(channels) => channels.iter().any(|c| c == p.channel()),
                None => true,
            })
            .map(Arc::clone)
            .collect()
    }

    async fn archive_outcomes(
        &self,
        generation: &GenerationResult,
        outcomes: &[PublishOutcome],
        degraded: &mut Vec<String>,
    ) {
        let Some(archive) = &self.archive else {
            return;
        };

        for outcome in outcomes.iter().filter(|o| o.success) {
            let url = outcome.post_id.clone().unwrap_or_default();
            let entry = ArchiveEntry::new(
                generation.text.clone(),
                outcome.channel.clone(),
                url,
                generation.model.clone(),
            );
            if let Err(e) = archive.store(&entry).await {
                tracing::warn!(channel = %outcome.channel, error = %e, "Archiving failed");
                degraded.push(format!("archive({}): {e}", outcome.channel));
            }
        }
    }

    /// Write the final status back, reporting rather than propagating errors.
    async fn finalize(&self, item: &WorkItem, summary: &RunSummary) -> Option<String> {
        match self.source.finalize(item.row, summary).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(row = item.row, error = %e, "Finalize writeback failed");
                Some(e.to_string())
            }
        }
    }

    /// Failed run with no claimed item; nothing to finalize.
    fn failed(&self, ctx: &RunContext, row: Option<u64>, error: String) -> RunOutcome {
        RunOutcome {
            schedule_id: ctx.schedule_id.clone(),
            status: RunStatus::Failed,
            row,
            outcomes: Vec::new(),
            degraded: Vec::new(),
            error: Some(error),
            finalize_error: None,
        }
    }

    /// Fail a claimed item: mark the row failed, then report the outcome.
    async fn fail_item(
        &self,
        ctx: &RunContext,
        item: &WorkItem,
        error: String,
        model: Option<&str>,
    ) -> RunOutcome {
        tracing::error!(row = item.row, %error, "Run failed");

        let summary = RunSummary {
            status: WorkItemStatus::Failed,
            completed_at: chrono::Utc::now(),
            url: None,
            generator: ctx.generator.clone(),
            model: model.unwrap_or_default().to_string(),
            notes: error.clone(),
        };
        let finalize_error = self.finalize(item, &summary).await;

        RunOutcome {
            schedule_id: ctx.schedule_id.clone(),
            status: RunStatus::Failed,
            row: Some(item.row),
            outcomes: Vec::new(),
            degraded: Vec::new(),
            error: Some(error),
            finalize_error,
        }
    }
}

#[async_trait::async_trait]
impl crate::scheduler::RunHandler for Orchestrator {
    async fn execute(&self, ctx: RunContext) -> RunOutcome {
        self.run(&ctx).await
    }
}

/// One line combining every channel's failure detail.
fn combined_errors(outcomes: &[PublishOutcome]) -> String {
    outcomes
        .iter()
        .filter_map(|o| {
            o.error
                .as_ref()
                .map(|error| format!("{}: {error}", o.channel))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
