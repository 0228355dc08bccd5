//! Suite-level fan-out and classification.

use crate::executor::{all_failed_result, VariantExecutor};
use crate::plan::CaseContext;
use crate::preflight::{ArtifactSet, ResolvedPaths};
use crate::report;
use anyhow::Context;
use divergate_adapters::staging::StagingArea;
use divergate_adapters::ProcessRunner;
use divergate_domain::{classify_result, summarize, OutputFilter, RunSummary};
use divergate_types::{Bucket, TestCase, TestResult, ToolsConfig, Variant};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Immutable run-wide switches, fixed before the first case launches.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub verbose: bool,

    /// Serialize the entire suite: one case at a time, in declaration order.
    /// Case-level `safe` flags only serialize within their own case.
    pub safe: bool,

    /// Default per-variant timeout; a per-test declaration overrides it.
    pub default_timeout: Option<Duration>,
}

/// Fans every test case out to an executor and folds the results.
pub struct RunCoordinator<R: ProcessRunner> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    runner: R,
    filter: OutputFilter,
    settings: RunSettings,
    paths: ResolvedPaths,
    artifacts: ArtifactSet,
    tools: ToolsConfig,
    variants: Vec<Variant>,
}

impl<R: ProcessRunner + 'static> RunCoordinator<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: R,
        filter: OutputFilter,
        settings: RunSettings,
        paths: ResolvedPaths,
        artifacts: ArtifactSet,
        tools: ToolsConfig,
        variants: Vec<Variant>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                filter,
                settings,
                paths,
                artifacts,
                tools,
                variants,
            }),
        }
    }

    /// Run the whole suite and report.
    ///
    /// Cases fan out concurrently; results come back in declaration order
    /// regardless of completion order, so reports are deterministic. The run
    /// finishes only when every case has resolved.
    pub async fn run_all(
        &self,
        tests: Vec<TestCase>,
    ) -> anyhow::Result<(RunSummary, Vec<TestResult>)> {
        let staging = Arc::new(StagingArea::new()?);

        let results = if self.inner.settings.safe {
            let mut results = Vec::with_capacity(tests.len());
            for test in &tests {
                results.push(self.inner.run_case(test, &staging).await);
            }
            results
        } else {
            let mut set = JoinSet::new();
            for (index, test) in tests.into_iter().enumerate() {
                let inner = Arc::clone(&self.inner);
                let staging = Arc::clone(&staging);
                set.spawn(async move { (index, inner.run_case(&test, &staging).await) });
            }

            let mut indexed = Vec::with_capacity(set.len());
            while let Some(joined) = set.join_next().await {
                indexed.push(joined.context("test task panicked")?);
            }
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, result)| result).collect()
        };

        for result in &results {
            if classify_result(result) == Bucket::FailedUnexpectedly {
                println!("{}", report::render_failure(result));
            } else if self.inner.settings.verbose {
                println!("{}", report::render_result(result));
            }
        }

        Ok((summarize(&results), results))
    }
}

impl<R: ProcessRunner> Inner<R> {
    async fn run_case(&self, test: &TestCase, staging: &StagingArea) -> TestResult {
        println!("Running test \"{}\"", test.name());
        let safe = self.settings.safe || test.safe();
        match self.case_context(test, staging) {
            Ok(ctx) => {
                VariantExecutor::new(&self.runner, &self.filter, self.settings.verbose)
                    .execute(test, &ctx, safe)
                    .await
            }
            Err(err) => all_failed_result(test, &self.variants, format!("{err:#}")),
        }
    }

    fn case_context(&self, test: &TestCase, staging: &StagingArea) -> anyhow::Result<CaseContext> {
        let dirs = staging.case_dirs(test.name())?;
        let (fixture, aux_fixture, input_file) = match test {
            TestCase::SingleFile(t) => (self.paths.sources.join(&t.source), None, None),
            TestCase::Packaged(t) => (
                self.paths.jars.join(&t.jar_file),
                t.copy_file.as_ref().map(|c| self.paths.jars.join(c)),
                t.input_file.as_ref().map(|i| self.paths.inputs.join(i)),
            ),
        };

        Ok(CaseContext {
            dirs,
            java: self.tools.java.clone(),
            javac: self.tools.javac.clone(),
            agent_jar: self.artifacts.agent_jar.clone(),
            support_jar: self.artifacts.support_jar.clone(),
            instrumenter_class: self.tools.instrumenter_class.clone(),
            fixture,
            aux_fixture,
            input_file,
            timeout: test.timeout().or(self.settings.default_timeout),
            variants: self.variants.clone(),
        })
    }
}
