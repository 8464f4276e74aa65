//! Pipeline orchestration: extraction, translation, analysis.
//!
//! Every run follows the same state machine:
//!
//! ```text
//! Init -> SessionAcquired -> Extracted -> Translated -> Analyzed -> SessionReleased
//! ```
//!
//! A failure may occur in any state; the run is marked failed with its cause
//! and the session is still released. Nothing escapes a run as an error, so
//! one failing target never disturbs its siblings in distributed mode.

use crate::analysis::{Analyzer, DEFAULT_REPEAT_THRESHOLD};
use crate::browser::{BrowserSession, SessionFactory};
use crate::config::{RunConfiguration, TargetDescriptor};
use crate::error::{BrowserError, PipelineError};
use crate::images::ImageSink;
use crate::models::{ArticleRecord, RunResult, RunStage};
use crate::scrapers::elpais;
use crate::translate::{TranslationService, Translator};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on concurrently open grid sessions.
pub const MAX_PARALLEL_SESSIONS: usize = 5;

/// Wires the extractor, translator and analyzer together for one invocation.
pub struct Pipeline<'a, T, I> {
    config: &'a RunConfiguration,
    translator: &'a Translator<T>,
    images: &'a I,
    analyzer: Analyzer,
}

impl<'a, T, I> Pipeline<'a, T, I>
where
    T: TranslationService,
    I: ImageSink,
{
    pub fn new(config: &'a RunConfiguration, translator: &'a Translator<T>, images: &'a I) -> Self {
        Self {
            config,
            translator,
            images,
            analyzer: Analyzer::new(DEFAULT_REPEAT_THRESHOLD, config.count_mode),
        }
    }

    /// Single session run against a local browser. Bounded only by the
    /// per-wait timeout.
    pub async fn run_local<F>(&self, factory: &F) -> RunResult
    where
        F: SessionFactory,
    {
        let target = TargetDescriptor::local(self.config.headless);
        self.run_target(factory, &target, None).await
    }

    /// One independent run per target, at most [`MAX_PARALLEL_SESSIONS`] at
    /// a time.
    ///
    /// `target_timeout` bounds acquisition plus extraction, translation and
    /// analysis. Release runs after it with its own bounds (`timeout` for the
    /// status report and again for close), so one worker can take up to
    /// `target_timeout + 2 * timeout` in total.
    ///
    /// The returned vector has one entry per target, in target order.
    #[instrument(level = "info", skip_all, fields(targets = targets.len()))]
    pub async fn run_distributed<F>(&self, factory: &F, targets: &[TargetDescriptor]) -> Vec<RunResult>
    where
        F: SessionFactory,
    {
        let budget = self.config.target_timeout;
        info!(
            parallel = MAX_PARALLEL_SESSIONS,
            ?budget,
            "Starting distributed run"
        );

        let mut slots: Vec<Option<RunResult>> = vec![None; targets.len()];
        let finished: Vec<(usize, RunResult)> = stream::iter(targets.iter().enumerate())
            .map(|(i, target)| async move {
                let result = self.run_target(factory, target, Some(budget)).await;
                (i, result)
            })
            .buffer_unordered(MAX_PARALLEL_SESSIONS)
            .collect()
            .await;

        for (i, result) in finished {
            slots[i] = Some(result);
        }

        let results: Vec<RunResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    let mut missing = RunResult::new(target.name.clone());
                    missing.fail_with(&PipelineError::Session("worker produced no result".into()));
                    missing.advance(RunStage::SessionReleased);
                    missing
                })
            })
            .collect();

        let completed = results.iter().filter(|r| r.is_completed()).count();
        info!(
            total = results.len(),
            completed,
            failed = results.len() - completed,
            "Distributed run finished"
        );
        results
    }

    /// Run the whole sequence against one target. Never returns early
    /// without releasing an acquired session.
    #[instrument(level = "info", skip_all, fields(target = %target))]
    async fn run_target<F>(
        &self,
        factory: &F,
        target: &TargetDescriptor,
        budget: Option<Duration>,
    ) -> RunResult
    where
        F: SessionFactory,
    {
        let t0 = Instant::now();
        let deadline = budget.map(|b| t0 + b);
        let mut run = RunResult::new(target.name.clone());

        let mut acquire = pin!(factory.acquire(target));
        let acquired = within(deadline, acquire.as_mut()).await;
        let session = match acquired {
            Some(Ok(session)) => Some(session),
            Some(Err(e)) => {
                error!(error = %e, "Could not acquire browser session");
                run.fail_with(&PipelineError::Session(format!("could not acquire session: {e}")));
                None
            }
            None => {
                error!(?budget, "Timed out acquiring browser session");
                run.fail_with(&timed_out(budget));
                self.reclaim(acquire.as_mut()).await
            }
        };

        match session {
            Some(mut session) => {
                if run.is_completed() {
                    run.advance(RunStage::SessionAcquired);
                    match within(deadline, self.drive(&mut session, &mut run)).await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            error!(error = %e, stage = ?run.stage(), "Run failed");
                            run.fail_with(&e);
                        }
                        None => {
                            error!(?budget, stage = ?run.stage(), "Run timed out");
                            run.fail_with(&timed_out(budget));
                        }
                    }
                    self.salvage_report(&mut run);
                }
                self.release(session, &mut run).await;
            }
            None => run.advance(RunStage::SessionReleased),
        }

        run.elapsed_ms = t0.elapsed().as_millis();
        info!(
            completed = run.is_completed(),
            articles = run.records.len(),
            elapsed_ms = run.elapsed_ms,
            "Run finished"
        );
        run
    }

    /// Extract, translate, analyze. Progress is written into `run` as it
    /// happens so a timeout keeps whatever was done.
    async fn drive<S>(&self, session: &mut S, run: &mut RunResult) -> Result<(), PipelineError>
    where
        S: BrowserSession,
    {
        run.records = elpais::extract(session, self.config, self.images).await?;
        run.advance(RunStage::Extracted);
        if run.records.is_empty() {
            warn!("No articles extracted");
        }

        run.translations = self.translator.translate_records(&mut run.records).await;
        run.advance(RunStage::Translated);

        let titles: Vec<&str> = run.records.iter().map(ArticleRecord::analysis_text).collect();
        run.report = Some(self.analyzer.analyze(&titles));
        run.advance(RunStage::Analyzed);
        Ok(())
    }

    /// Give an acquisition that overran the deadline `timeout` more to finish,
    /// so a session the environment already opened can still be closed.
    async fn reclaim<A, S>(&self, acquire: A) -> Option<S>
    where
        A: Future<Output = Result<S, BrowserError>>,
    {
        match timeout(self.config.timeout, acquire).await {
            Ok(Ok(session)) => {
                warn!("Session arrived after the deadline; closing it");
                Some(session)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Late acquisition failed");
                None
            }
            Err(_) => {
                warn!("Abandoned session acquisition; the remote session may stay open until the grid's idle timeout");
                None
            }
        }
    }

    /// Best-effort report from whatever records a failed run managed to get.
    fn salvage_report(&self, run: &mut RunResult) {
        if run.report.is_none() && !run.records.is_empty() {
            let titles: Vec<&str> = run.records.iter().map(ArticleRecord::analysis_text).collect();
            run.report = Some(self.analyzer.analyze(&titles));
        }
    }

    /// Report the outcome to the session's environment and close it.
    async fn release<S>(&self, mut session: S, run: &mut RunResult)
    where
        S: BrowserSession,
    {
        let reason = match run.failure() {
            Some(failure) => failure.message.clone(),
            None => format!("{} articles scraped", run.records.len()),
        };
        match timeout(self.config.timeout, session.report_status(run.is_completed(), &reason)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Could not report session status"),
            Err(_) => warn!("Reporting session status timed out"),
        }

        match timeout(self.config.timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Session teardown failed");
                run.fail_with(&PipelineError::Session(format!("teardown failed: {e}")));
            }
            Err(_) => {
                error!("Session teardown timed out");
                run.fail_with(&PipelineError::Session("teardown timed out".into()));
            }
        }
        run.advance(RunStage::SessionReleased);
    }
}

/// Await `fut`, giving up at `deadline` when there is one.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn timed_out(budget: Option<Duration>) -> PipelineError {
    PipelineError::Timeout(budget.unwrap_or_default())
}
