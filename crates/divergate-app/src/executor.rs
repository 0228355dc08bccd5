//! Per-case execution.
//!
//! Stages inputs, runs pre-steps, launches every variant, and always resolves
//! to a `TestResult`. Execution trouble becomes data, never an error crossing
//! back to the coordinator.

use crate::plan::{self, CaseContext};
use divergate_adapters::staging;
use divergate_adapters::{CommandSpec, ExecError, ProcessRunner, RawExecution};
use divergate_domain::OutputFilter;
use divergate_types::{ExecutionResult, TestCase, TestResult, Variant, VariantOutcome};
use futures::future::join_all;

pub struct VariantExecutor<'a, R: ProcessRunner> {
    runner: &'a R,
    filter: &'a OutputFilter,
    verbose: bool,
}

impl<'a, R: ProcessRunner> VariantExecutor<'a, R> {
    pub fn new(runner: &'a R, filter: &'a OutputFilter, verbose: bool) -> Self {
        Self {
            runner,
            filter,
            verbose,
        }
    }

    /// Run one case to a fully populated result.
    ///
    /// Under `safe`, pre-steps and variants execute strictly sequentially in
    /// declaration order through the blocking runner; otherwise pre-steps fan
    /// out and all variants launch concurrently. Either way every variant
    /// resolves before the result exists.
    pub async fn execute(&self, test: &TestCase, ctx: &CaseContext, safe: bool) -> TestResult {
        match self.try_execute(test, ctx, safe).await {
            Ok(result) => result,
            // Staging trouble: nothing launched, so every slot reports it.
            Err(err) => all_failed_result(test, &ctx.variants, format!("{err:#}")),
        }
    }

    async fn try_execute(
        &self,
        test: &TestCase,
        ctx: &CaseContext,
        safe: bool,
    ) -> anyhow::Result<TestResult> {
        staging::stage_file(&ctx.fixture, &ctx.dirs.dir)?;
        if let Some(aux) = &ctx.aux_fixture {
            staging::stage_file(aux, &ctx.dirs.dir)?;
        }

        if let TestCase::SingleFile(single) = test {
            let compile = plan::compile_command(single, ctx);
            let outcome = self.run_one(&compile, safe).await;
            // A failed compile is signal, not an abort: the comparison runs
            // will fail uniformly against the absent artifact.
            if self.verbose {
                if let Ok(raw) = &outcome {
                    if raw.exit_code != 0 {
                        println!("\tCompile step for \"{}\" exited {}", test.name(), raw.exit_code);
                    }
                }
            }
        }

        if ctx.variants.contains(&Variant::Instrumented) {
            let commands = match test {
                TestCase::SingleFile(single) => {
                    let classes =
                        staging::compiled_classes(&ctx.dirs.dir, single.program_name())?;
                    plan::class_instrument_commands(&classes, ctx)
                }
                TestCase::Packaged(packaged) => vec![plan::jar_instrument_command(packaged, ctx)],
            };
            if safe {
                for command in &commands {
                    let _ = self.runner.run_blocking(command);
                }
            } else {
                join_all(commands.iter().map(|command| self.runner.run(command))).await;
            }
        }

        let mut outcomes = Vec::with_capacity(ctx.variants.len());
        if safe {
            for &variant in &ctx.variants {
                let command = plan::variant_command(test, variant, ctx);
                outcomes.push((variant, self.outcome(self.runner.run_blocking(&command))));
            }
        } else {
            let commands: Vec<(Variant, CommandSpec)> = ctx
                .variants
                .iter()
                .map(|&variant| (variant, plan::variant_command(test, variant, ctx)))
                .collect();
            let raw = join_all(commands.iter().map(|(_, command)| self.runner.run(command))).await;
            for ((variant, _), res) in commands.iter().zip(raw) {
                outcomes.push((*variant, self.outcome(res)));
            }
        }

        Ok(TestResult {
            name: test.name().to_string(),
            failure_expected: test.failure_expected(),
            outcomes,
        })
    }

    async fn run_one(
        &self,
        command: &CommandSpec,
        safe: bool,
    ) -> Result<RawExecution, ExecError> {
        if safe {
            self.runner.run_blocking(command)
        } else {
            self.runner.run(command).await
        }
    }

    fn outcome(&self, res: Result<RawExecution, ExecError>) -> VariantOutcome {
        match res {
            Ok(raw) if raw.timed_out => VariantOutcome::TimedOut,
            Ok(raw) => VariantOutcome::Completed(ExecutionResult::new(
                raw.exit_code,
                self.filter.apply(&raw.stdout),
                self.filter.apply(&raw.stderr),
            )),
            Err(err) => VariantOutcome::SpawnFailed(err.to_string()),
        }
    }
}

/// A result whose every slot records the same launch problem.
pub fn all_failed_result(test: &TestCase, variants: &[Variant], reason: String) -> TestResult {
    TestResult {
        name: test.name().to_string(),
        failure_expected: test.failure_expected(),
        outcomes: variants
            .iter()
            .map(|&variant| (variant, VariantOutcome::SpawnFailed(reason.clone())))
            .collect(),
    }
}
