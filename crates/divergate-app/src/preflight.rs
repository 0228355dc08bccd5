//! Pre-flight checks and optional rebuild steps.
//!
//! Everything here either passes before the first test launches or terminates
//! the run; nothing below this layer reports missing files as test failures.

use anyhow::{bail, ensure, Context};
use divergate_adapters::{command, ProcessRunner};
use divergate_types::{PathsConfig, TestCase, ToolsConfig};
use std::path::{Path, PathBuf};

/// Fixture and artifact locations, resolved against the config file's
/// directory once at startup.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub sources: PathBuf,
    pub jars: PathBuf,
    pub inputs: PathBuf,
    pub artifacts: PathBuf,
    pub project: PathBuf,
}

impl ResolvedPaths {
    pub fn resolve(base: &Path, config: &PathsConfig) -> Self {
        Self {
            sources: base.join(&config.sources),
            jars: base.join(&config.jars),
            inputs: base.join(&config.inputs),
            artifacts: base.join(&config.artifacts),
            project: base.join(&config.project),
        }
    }
}

/// The instrumentation artifact pair one run exercises.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub agent_jar: PathBuf,
    pub support_jar: PathBuf,
}

impl ArtifactSet {
    pub fn resolve(paths: &ResolvedPaths, tools: &ToolsConfig, version_tag: &str) -> Self {
        let jar = |base: &str| paths.artifacts.join(format!("{base}-{version_tag}.jar"));
        Self {
            agent_jar: jar(&tools.agent_jar),
            support_jar: jar(&tools.support_jar),
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        for jar in [&self.agent_jar, &self.support_jar] {
            ensure!(
                jar.is_file(),
                "required artifact {} does not exist (build it, or pass --build-first)",
                jar.display()
            );
        }
        Ok(())
    }
}

/// Every file a declaration points at must exist before anything runs.
pub fn check_fixtures(tests: &[TestCase], paths: &ResolvedPaths) -> anyhow::Result<()> {
    let mut check = |what: &str, name: &str, path: PathBuf| -> anyhow::Result<()> {
        ensure!(
            path.is_file(),
            "test {name:?}: {what} {} does not exist",
            path.display()
        );
        Ok(())
    };

    for test in tests {
        match test {
            TestCase::SingleFile(t) => {
                check("source file", &t.name, paths.sources.join(&t.source))?;
            }
            TestCase::Packaged(t) => {
                check("jar file", &t.name, paths.jars.join(&t.jar_file))?;
                if let Some(input) = &t.input_file {
                    check("input file", &t.name, paths.inputs.join(input))?;
                }
                if let Some(aux) = &t.copy_file {
                    check("copy file", &t.name, paths.jars.join(aux))?;
                }
            }
        }
    }
    Ok(())
}

/// Rebuild the instrumentation artifacts through the project's build wrapper.
/// The build system is a black box; only its exit code matters here.
pub fn build_artifacts<R: ProcessRunner>(
    runner: &R,
    project_dir: &Path,
    build_task: &str,
) -> anyhow::Result<()> {
    let spec = command(
        vec!["./gradlew".into(), "clean".into(), build_task.into()],
        project_dir,
    );
    let out = runner
        .run_blocking(&spec)
        .context("run the artifact build")?;
    if out.exit_code != 0 {
        bail!(
            "artifact build failed with exit code {}:\n{}",
            out.exit_code,
            String::from_utf8_lossy(&out.stderr)
        );
    }
    Ok(())
}

/// Rebuild the fixture archives the packaged tests exercise.
pub fn build_fixture_jars<R: ProcessRunner>(runner: &R, jars_dir: &Path) -> anyhow::Result<()> {
    let spec = command(vec!["bash".into(), "build.sh".into()], jars_dir);
    let out = runner
        .run_blocking(&spec)
        .context("run the fixture build")?;
    if out.exit_code != 0 {
        bail!(
            "fixture build failed with exit code {}:\n{}",
            out.exit_code,
            String::from_utf8_lossy(&out.stderr)
        );
    }
    Ok(())
}
