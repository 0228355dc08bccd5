//! Shared contracts for divergate.
//!
//! Design goal: versioned, explicit, boring.
//! These structs carry test declarations in, and run receipts out. Everything
//! here is data; policy lives in `divergate-domain`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

pub const RUN_SCHEMA_V1: &str = "divergate.run.v1";

/// One way of invoking the program under test within a single test case.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// The unmodified program.
    Regular,
    /// The unmodified artifact with the transforming agent attached at launch.
    Agent,
    /// A pre-instrumented artifact executed from its own subdirectory.
    Instrumented,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Regular => "regular",
            Variant::Agent => "agent",
            Variant::Instrumented => "instrumented",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one completed process execution.
///
/// `stdout`/`stderr` hold *normalized* bytes: the output filter runs before
/// construction, so equality here is the comparison the whole harness gates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// What became of one variant's execution attempt.
///
/// Only `Completed` carries a comparable result; the other arms exist so a
/// launch failure stays distinguishable from a nonzero exit, and neither is
/// ever propagated as an error past the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    Completed(ExecutionResult),
    SpawnFailed(String),
    TimedOut,
}

impl VariantOutcome {
    pub fn as_completed(&self) -> Option<&ExecutionResult> {
        match self {
            VariantOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// All variant outcomes for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub failure_expected: bool,
    pub outcomes: Vec<(Variant, VariantOutcome)>,
}

impl TestResult {
    /// True iff every variant completed and all completed results agree.
    ///
    /// Independent of `failure_expected`; classification crosses the two.
    pub fn successful(&self) -> bool {
        let mut completed = self.outcomes.iter().map(|(_, o)| o.as_completed());
        let Some(Some(first)) = completed.next() else {
            return false;
        };
        completed.all(|o| o == Some(first))
    }
}

/// Classification of one test result against its declared expectation.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Variants agreed, as declared.
    Passed,
    /// Variants agreed although the declaration tolerates divergence; worth a look.
    PassedUnexpectedly,
    /// Variants diverged, but the declaration tolerates it.
    FailedExpectedly,
    /// Variants diverged with no tolerance declared. Counts toward the exit status.
    FailedUnexpectedly,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Passed => "passed",
            Bucket::PassedUnexpectedly => "passed_unexpectedly",
            Bucket::FailedExpectedly => "failed_expectedly",
            Bucket::FailedUnexpectedly => "failed_unexpectedly",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------
// Test declarations / config file
// ----------------------------

/// A test that starts from a source file: the pre-step compiles it in the
/// staging directory, then the variants exercise the compiled program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleFileTest {
    pub name: String,

    /// Source file name under the configured sources directory.
    pub source: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    pub safe: bool,

    #[serde(default)]
    pub failure_expected: bool,

    /// Per-variant timeout, e.g. "30s". Overrides the run-wide default.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl SingleFileTest {
    /// Program name the compiled artifact is invoked as.
    pub fn program_name(&self) -> &str {
        self.source.strip_suffix(".java").unwrap_or(&self.source)
    }
}

fn default_entry_point() -> String {
    "Main".to_string()
}

/// A test that exercises a pre-built program archive directly; no compile step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackagedTest {
    pub name: String,

    /// Archive name under the configured jars directory.
    pub jar_file: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    pub safe: bool,

    /// Fixed standard input, as a file name under the inputs directory.
    #[serde(default)]
    pub input_file: Option<String>,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    #[serde(default)]
    pub failure_expected: bool,

    /// Auxiliary file staged next to the archive before execution.
    #[serde(default)]
    pub copy_file: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Declarative description of one test, polymorphic over the artifact kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TestCase {
    SingleFile(SingleFileTest),
    Packaged(PackagedTest),
}

impl TestCase {
    pub fn name(&self) -> &str {
        match self {
            TestCase::SingleFile(t) => &t.name,
            TestCase::Packaged(t) => &t.name,
        }
    }

    pub fn safe(&self) -> bool {
        match self {
            TestCase::SingleFile(t) => t.safe,
            TestCase::Packaged(t) => t.safe,
        }
    }

    pub fn failure_expected(&self) -> bool {
        match self {
            TestCase::SingleFile(t) => t.failure_expected,
            TestCase::Packaged(t) => t.failure_expected,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            TestCase::SingleFile(t) => t.timeout,
            TestCase::Packaged(t) => t.timeout,
        }
    }

    pub fn arguments(&self) -> &[String] {
        match self {
            TestCase::SingleFile(t) => &t.arguments,
            TestCase::Packaged(t) => &t.arguments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// All paths resolve against the config file's directory.
    #[serde(default = "default_sources")]
    pub sources: String,

    #[serde(default = "default_jars")]
    pub jars: String,

    #[serde(default = "default_inputs")]
    pub inputs: String,

    /// Where the instrumentation artifact set lives.
    #[serde(default = "default_artifacts")]
    pub artifacts: String,

    /// Root of the project the `--build-first` step rebuilds.
    #[serde(default = "default_project")]
    pub project: String,
}

fn default_sources() -> String {
    "src".to_string()
}
fn default_jars() -> String {
    "jars".to_string()
}
fn default_inputs() -> String {
    "jars/inputs".to_string()
}
fn default_artifacts() -> String {
    "../build/libs".to_string()
}
fn default_project() -> String {
    "..".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            jars: default_jars(),
            inputs: default_inputs(),
            artifacts: default_artifacts(),
            project: default_project(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_java")]
    pub java: String,

    #[serde(default = "default_javac")]
    pub javac: String,

    /// Base name of the agent/instrumenter jar; `-<version-tag>.jar` is appended.
    #[serde(default = "default_agent_jar")]
    pub agent_jar: String,

    /// Base name of the runtime-support jar instrumented programs run against.
    #[serde(default = "default_support_jar")]
    pub support_jar: String,

    /// Class invoked to instrument a packaged archive.
    #[serde(default = "default_entry_point")]
    pub instrumenter_class: String,
}

fn default_java() -> String {
    "java".to_string()
}
fn default_javac() -> String {
    "javac".to_string()
}
fn default_agent_jar() -> String {
    "agent".to_string()
}
fn default_support_jar() -> String {
    "runtime".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            javac: default_javac(),
            agent_jar: default_agent_jar(),
            support_jar: default_support_jar(),
            instrumenter_class: default_entry_point(),
        }
    }
}

/// Output-normalization rules, applied line-wise to raw stdout/stderr before
/// any comparison. The default is the identity: nothing instrumentation-
/// specific is baked into the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputFiltersConfig {
    /// Lines equal to one of these literals are dropped.
    #[serde(default)]
    pub strip_lines: Vec<String>,

    /// Lines matching one of these regexes are dropped.
    #[serde(default)]
    pub strip_patterns: Vec<String>,
}

fn default_variants() -> Vec<Variant> {
    vec![Variant::Regular, Variant::Agent, Variant::Instrumented]
}

/// The test declaration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub single_file_tests: Vec<SingleFileTest>,

    #[serde(default)]
    pub jar_tests: Vec<PackagedTest>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Which execution variants each test runs; two or three slots.
    #[serde(default = "default_variants")]
    pub variants: Vec<Variant>,

    #[serde(default)]
    pub output_filters: OutputFiltersConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            single_file_tests: Vec::new(),
            jar_tests: Vec::new(),
            paths: PathsConfig::default(),
            tools: ToolsConfig::default(),
            variants: default_variants(),
            output_filters: OutputFiltersConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeclarationError {
    #[error("duplicate test name: {0}")]
    DuplicateName(String),

    #[error("test name {0:?} must be non-empty and must not contain path separators")]
    InvalidName(String),

    #[error("at least two execution variants are required, got {0}")]
    TooFewVariants(usize),

    #[error("variant {0} listed more than once")]
    DuplicateVariant(Variant),
}

impl ConfigFile {
    /// All declared cases, single-file tests first, in declaration order.
    pub fn test_cases(&self) -> Vec<TestCase> {
        self.single_file_tests
            .iter()
            .cloned()
            .map(TestCase::SingleFile)
            .chain(self.jar_tests.iter().cloned().map(TestCase::Packaged))
            .collect()
    }

    /// Structural checks that must hold before anything executes.
    ///
    /// Names key staging directories and reports, so they must be unique and
    /// filesystem-safe. An empty suite is fine; an empty variant set is not.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if self.variants.len() < 2 {
            return Err(DeclarationError::TooFewVariants(self.variants.len()));
        }
        let mut seen_variants = BTreeSet::new();
        for v in &self.variants {
            if !seen_variants.insert(*v) {
                return Err(DeclarationError::DuplicateVariant(*v));
            }
        }

        let mut seen = BTreeSet::new();
        for case in self.test_cases() {
            let name = case.name();
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(DeclarationError::InvalidName(name.to_string()));
            }
            if !seen.insert(name.to_string()) {
                return Err(DeclarationError::DuplicateName(name.to_string()));
            }
        }
        Ok(())
    }
}

// ----------------------------
// Run receipt
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub host: HostInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SummaryCounts {
    pub total: u32,
    pub passed: u32,
    pub passed_unexpectedly: u32,
    pub failed_expectedly: u32,
    pub failed_unexpectedly: u32,
}

/// One variant's outcome, rendered for the receipt. Output bytes are
/// interpreted as UTF-8 lossily here; the comparison itself stays byte-exact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantReport {
    pub variant: Variant,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestReport {
    pub name: String,
    pub bucket: Bucket,
    pub failure_expected: bool,
    pub variants: Vec<VariantReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub summary: SummaryCounts,
    pub tests: Vec<TestReport>,
}
