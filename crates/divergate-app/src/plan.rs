//! Command-line planning.
//!
//! Pure functions from a test declaration plus a resolved case context to the
//! exact process invocations each phase needs. Nothing here runs anything.

use divergate_adapters::staging::CaseDirs;
use divergate_adapters::CommandSpec;
use divergate_types::{PackagedTest, SingleFileTest, TestCase, Variant};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a single case's commands depend on, resolved up front and
/// immutable for the case's lifetime.
#[derive(Debug, Clone)]
pub struct CaseContext {
    pub dirs: CaseDirs,
    pub java: String,
    pub javac: String,
    pub agent_jar: PathBuf,
    pub support_jar: PathBuf,
    pub instrumenter_class: String,

    /// The source file or archive to stage into the case directory.
    pub fixture: PathBuf,

    /// Auxiliary file staged next to the fixture, if declared.
    pub aux_fixture: Option<PathBuf>,

    /// Fixed stdin for the comparison-phase runs, if declared.
    pub input_file: Option<PathBuf>,

    pub timeout: Option<Duration>,
    pub variants: Vec<Variant>,
}

impl CaseContext {
    fn spec(&self, argv: Vec<String>, cwd: &Path, piped: bool) -> CommandSpec {
        CommandSpec {
            argv,
            cwd: cwd.to_path_buf(),
            stdin_file: if piped { self.input_file.clone() } else { None },
            timeout: self.timeout,
        }
    }
}

fn classpath(first: impl AsRef<str>, second: impl AsRef<str>) -> String {
    format!("{}:{}", first.as_ref(), second.as_ref())
}

/// Compile a staged source file in place.
pub fn compile_command(test: &SingleFileTest, ctx: &CaseContext) -> CommandSpec {
    ctx.spec(
        vec![
            ctx.javac.clone(),
            "-encoding".into(),
            "UTF-8".into(),
            test.source.clone(),
        ],
        &ctx.dirs.dir,
        false,
    )
}

/// Instrument each compiled class into the case's instrumented directory.
pub fn class_instrument_commands(classes: &[PathBuf], ctx: &CaseContext) -> Vec<CommandSpec> {
    classes
        .iter()
        .map(|class| {
            let name = class.file_name().unwrap_or(class.as_os_str());
            let output = ctx.dirs.instrumented.join(name);
            ctx.spec(
                vec![
                    ctx.java.clone(),
                    "-jar".into(),
                    ctx.agent_jar.display().to_string(),
                    "-f".into(),
                    class.display().to_string(),
                    "-o".into(),
                    output.display().to_string(),
                ],
                &ctx.dirs.dir,
                false,
            )
        })
        .collect()
}

/// Instrument a staged archive into the case's instrumented directory.
///
/// The agent jar cannot be executed with `-jar` here: the input archive must
/// also be on the class path, so the instrumenter class is named explicitly.
pub fn jar_instrument_command(test: &PackagedTest, ctx: &CaseContext) -> CommandSpec {
    let input = ctx.dirs.dir.join(&test.jar_file);
    let output = ctx.dirs.instrumented.join(&test.jar_file);
    ctx.spec(
        vec![
            ctx.java.clone(),
            "-classpath".into(),
            classpath(ctx.agent_jar.display().to_string(), input.display().to_string()),
            ctx.instrumenter_class.clone(),
            "-f".into(),
            input.display().to_string(),
            "-o".into(),
            output.display().to_string(),
        ],
        &ctx.dirs.dir,
        false,
    )
}

/// The comparison-phase invocation for one variant.
pub fn variant_command(test: &TestCase, variant: Variant, ctx: &CaseContext) -> CommandSpec {
    match test {
        TestCase::SingleFile(t) => single_file_variant(t, variant, ctx),
        TestCase::Packaged(t) => packaged_variant(t, variant, ctx),
    }
}

fn single_file_variant(test: &SingleFileTest, variant: Variant, ctx: &CaseContext) -> CommandSpec {
    let program = test.program_name().to_string();
    let agent = ctx.agent_jar.display().to_string();
    let mut argv;
    let cwd;
    match variant {
        Variant::Regular => {
            argv = vec![ctx.java.clone(), program];
            cwd = &ctx.dirs.dir;
        }
        Variant::Agent => {
            argv = vec![
                ctx.java.clone(),
                "-classpath".into(),
                classpath(".", &agent),
                format!("-javaagent:{agent}"),
                program,
            ];
            cwd = &ctx.dirs.dir;
        }
        Variant::Instrumented => {
            argv = vec![
                ctx.java.clone(),
                "-classpath".into(),
                classpath(".", ctx.support_jar.display().to_string()),
                program,
            ];
            cwd = &ctx.dirs.instrumented;
        }
    }
    argv.extend(test.arguments.iter().cloned());
    ctx.spec(argv, cwd, true)
}

fn packaged_variant(test: &PackagedTest, variant: Variant, ctx: &CaseContext) -> CommandSpec {
    let agent = ctx.agent_jar.display().to_string();
    let mut argv;
    let cwd;
    match variant {
        Variant::Regular => {
            argv = vec![ctx.java.clone(), "-jar".into(), test.jar_file.clone()];
            cwd = &ctx.dirs.dir;
        }
        Variant::Agent => {
            argv = vec![
                ctx.java.clone(),
                "-cp".into(),
                classpath(&agent, &test.jar_file),
                format!("-javaagent:{agent}"),
                test.entry_point.clone(),
            ];
            cwd = &ctx.dirs.dir;
        }
        Variant::Instrumented => {
            argv = vec![
                ctx.java.clone(),
                "-cp".into(),
                classpath(ctx.support_jar.display().to_string(), &test.jar_file),
                test.entry_point.clone(),
            ];
            cwd = &ctx.dirs.instrumented;
        }
    }
    argv.extend(test.arguments.iter().cloned());
    ctx.spec(argv, cwd, true)
}
