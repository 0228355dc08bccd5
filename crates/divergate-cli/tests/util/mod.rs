//! Sandbox for CLI integration tests.
//!
//! Builds a throwaway tree with stub `java`/`javac` shell scripts, fixture
//! files, and instrumentation artifacts, so the whole engine runs without a
//! JVM anywhere near it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TAG: &str = "0.0.1-SNAPSHOT";

pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create sandbox"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("tests/config.json")
    }

    /// Drop an executable shell script into `bin/` and return its path.
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let bin = self.root().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    /// A javac stand-in that succeeds silently.
    pub fn stub_javac(&self) -> PathBuf {
        self.write_script("javac", "exit 0")
    }

    /// Write a fixture file under `tests/`.
    pub fn add_fixture(&self, relative: &str, content: &[u8]) {
        let path = self.root().join("tests").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Create the agent/runtime artifact pair the default config expects.
    pub fn add_artifacts(&self) {
        let dir = self.root().join("artifacts");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("agent-{TAG}.jar")), b"").unwrap();
        fs::write(dir.join(format!("runtime-{TAG}.jar")), b"").unwrap();
    }

    /// Config skeleton pointing at the sandbox layout and stub tools.
    pub fn base_config(&self, java: &Path, javac: &Path) -> serde_json::Value {
        serde_json::json!({
            "paths": {
                "sources": "src",
                "jars": "jars",
                "inputs": "jars/inputs",
                "artifacts": "../artifacts",
                "project": ".."
            },
            "tools": {
                "java": java.display().to_string(),
                "javac": javac.display().to_string()
            }
        })
    }

    pub fn write_config(&self, config: &serde_json::Value) {
        let tests = self.root().join("tests");
        fs::create_dir_all(&tests).unwrap();
        fs::write(
            tests.join("config.json"),
            serde_json::to_vec_pretty(config).unwrap(),
        )
        .unwrap();
    }

    /// The standard single packaged test setup: one jar test named `App`
    /// running under the given stub `java` body, all three variants active.
    pub fn packaged_app(&self, java_body: &str, extra: serde_json::Value) -> assert_cmd::Command {
        let java = self.write_script("java", java_body);
        let javac = self.stub_javac();
        self.add_artifacts();
        self.add_fixture("jars/app.jar", b"jar");

        let mut config = self.base_config(&java, &javac);
        config["jar_tests"] = serde_json::json!([{ "name": "App", "jar_file": "app.jar" }]);
        merge(&mut config, extra);
        self.write_config(&config);

        self.command()
    }

    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("divergate").expect("binary built");
        cmd.arg("--config").arg(self.config_path());
        cmd.current_dir(self.root());
        cmd
    }
}

/// Shallow-merge `extra`'s top-level keys into `config`.
pub fn merge(config: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base), Some(add)) = (config.as_object_mut(), extra.as_object()) {
        for (k, v) in add {
            base.insert(k.clone(), v.clone());
        }
    }
}
