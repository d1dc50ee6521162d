// crates/topgun-harness/src/deploy/tool.rs
// ============================================================================
// Module: Deploy Tool
// Description: Argument rendering for the external deployment tool.
// Purpose: Keep every deploy-tool command line in one place.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`DeployTool`] knows the program, the lane's deployment name, and the
//! release versions. It only renders argument vectors; spawning is left to the
//! session manager so every invocation is captured the same way.

use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use crate::config::ReleaseVersions;

/// One ordered override passed to a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployArg {
    /// `-o <path>`: apply an ops file.
    OpsFile(PathBuf),
    /// `-v <key>=<value>`: set a manifest variable.
    Var(String, String),
    /// `--vars-store <path>`: persist generated credentials.
    VarsStore(PathBuf),
    /// Passed through verbatim.
    Raw(String),
}

impl DeployArg {
    /// Builds an ops-file override.
    pub fn ops_file(path: impl Into<PathBuf>) -> Self {
        Self::OpsFile(path.into())
    }

    /// Builds a variable override.
    pub fn var(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Var(key.into(), value.into())
    }

    fn push_onto(&self, args: &mut Vec<OsString>) {
        match self {
            Self::OpsFile(path) => {
                args.push("-o".into());
                args.push(path.into());
            }
            Self::Var(key, value) => {
                args.push("-v".into());
                args.push(format!("{key}={value}").into());
            }
            Self::VarsStore(path) => {
                args.push("--vars-store".into());
                args.push(path.into());
            }
            Self::Raw(raw) => args.push(raw.into()),
        }
    }
}

/// Renders deploy-tool invocations for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTool {
    program: PathBuf,
    deployment: String,
    releases: ReleaseVersions,
}

impl DeployTool {
    /// Creates a renderer for `deployment`.
    pub fn new(
        program: impl Into<PathBuf>,
        deployment: impl Into<String>,
        releases: ReleaseVersions,
    ) -> Self {
        Self {
            program: program.into(),
            deployment: deployment.into(),
            releases,
        }
    }

    /// Returns the tool program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the deployment name.
    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// `-n -d <name> deploy <manifest> -v deployment_name=<name> <versions> <args>`
    #[must_use]
    pub fn deploy_args(&self, manifest: &Path, overrides: &[DeployArg]) -> Vec<OsString> {
        let mut args = self.scoped(true);
        args.push("deploy".into());
        args.push(manifest.into());
        DeployArg::var("deployment_name", self.deployment.as_str()).push_onto(&mut args);
        for (key, version) in self.releases.as_deploy_vars() {
            DeployArg::var(key, version).push_onto(&mut args);
        }
        for arg in overrides {
            arg.push_onto(&mut args);
        }
        args
    }

    /// `-d <name> instances --ps`
    #[must_use]
    pub fn instances_args(&self) -> Vec<OsString> {
        let mut args = self.scoped(false);
        args.extend(["instances".into(), "--ps".into()]);
        args
    }

    /// `-d <name> logs -f`
    #[must_use]
    pub fn logs_args(&self) -> Vec<OsString> {
        let mut args = self.scoped(false);
        args.extend(["logs".into(), "-f".into()]);
        args
    }

    /// `-n -d <name> stop <instance>`
    #[must_use]
    pub fn stop_args(&self, instance: &str) -> Vec<OsString> {
        let mut args = self.scoped(true);
        args.extend(["stop".into(), instance.into()]);
        args
    }

    /// `-n -d <name> start <instance>`
    #[must_use]
    pub fn start_args(&self, instance: &str) -> Vec<OsString> {
        let mut args = self.scoped(true);
        args.extend(["start".into(), instance.into()]);
        args
    }

    /// `-d <name> ssh <instance> -c <command>`
    #[must_use]
    pub fn ssh_args(&self, instance: &str, command: &str) -> Vec<OsString> {
        let mut args = self.scoped(false);
        args.extend(["ssh".into(), instance.into(), "-c".into(), command.into()]);
        args
    }

    /// `-n -d <name> delete-deployment --force`
    #[must_use]
    pub fn delete_args(&self) -> Vec<OsString> {
        let mut args = self.scoped(true);
        args.extend(["delete-deployment".into(), "--force".into()]);
        args
    }

    fn scoped(&self, non_interactive: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if non_interactive {
            args.push("-n".into());
        }
        args.push("-d".into());
        args.push(self.deployment.as_str().into());
        args
    }
}
