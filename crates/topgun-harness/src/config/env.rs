// crates/topgun-harness/src/config/env.rs
// ============================================================================
// Module: Harness Environment
// Description: Environment-backed configuration for deployment scenarios.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 fails closed. Parsing goes through an
//! injectable lookup so callers other than [`HarnessConfig::load`] never need
//! to touch the process environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarnessError;
use crate::error::HarnessResult;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Release version used when an override variable is unset.
pub const DEFAULT_RELEASE_VERSION: &str = "latest";

/// Default warm-up wait after a deploy, in seconds.
const DEFAULT_WARMUP_SECS: u64 = 20;

/// Environment keys for harness configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessEnv {
    /// Concourse release version override.
    ConcourseRelease,
    /// Garden runC release version override.
    GardenRuncRelease,
    /// Postgres release version override.
    PostgresRelease,
    /// Git server release version override.
    GitServerRelease,
    /// Vault release version override.
    VaultRelease,
    /// CredHub release version override.
    CredhubRelease,
    /// Stemcell version override.
    Stemcell,
    /// Deploy tool program.
    DeployTool,
    /// Wrapped CLI binary.
    FlyBinary,
    /// Base lane index (positive integer).
    Lane,
    /// Post-deploy warm-up in seconds.
    WarmupSeconds,
    /// Minimum convergence timeout in seconds (positive integer).
    TimeoutSeconds,
    /// Username for the deployed system.
    AtcUsername,
    /// Password for the deployed system.
    AtcPassword,
    /// Job hosting the public web endpoint.
    WebJob,
    /// Job hosting the backing data store.
    DbJob,
}

impl HarnessEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConcourseRelease => "CONCOURSE_RELEASE_VERSION",
            Self::GardenRuncRelease => "GARDEN_RUNC_RELEASE_VERSION",
            Self::PostgresRelease => "POSTGRES_RELEASE_VERSION",
            Self::GitServerRelease => "GIT_SERVER_RELEASE_VERSION",
            Self::VaultRelease => "VAULT_RELEASE_VERSION",
            Self::CredhubRelease => "CREDHUB_RELEASE_VERSION",
            Self::Stemcell => "STEMCELL_VERSION",
            Self::DeployTool => "TOPGUN_DEPLOY_TOOL",
            Self::FlyBinary => "TOPGUN_FLY_BIN",
            Self::Lane => "TOPGUN_LANE",
            Self::WarmupSeconds => "TOPGUN_WARMUP_SEC",
            Self::TimeoutSeconds => "TOPGUN_TIMEOUT_SEC",
            Self::AtcUsername => "TOPGUN_ATC_USERNAME",
            Self::AtcPassword => "TOPGUN_ATC_PASSWORD",
            Self::WebJob => "TOPGUN_WEB_JOB",
            Self::DbJob => "TOPGUN_DB_JOB",
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Per-component release versions forwarded to every deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersions {
    /// Concourse release.
    pub concourse: String,
    /// Garden runC release.
    pub garden_runc: String,
    /// Postgres release.
    pub postgres: String,
    /// Git server release.
    pub git_server: String,
    /// Vault release.
    pub vault: String,
    /// CredHub release.
    pub credhub: String,
    /// Stemcell.
    pub stemcell: String,
}

impl Default for ReleaseVersions {
    fn default() -> Self {
        let latest = || DEFAULT_RELEASE_VERSION.to_string();
        Self {
            concourse: latest(),
            garden_runc: latest(),
            postgres: latest(),
            git_server: latest(),
            vault: latest(),
            credhub: latest(),
            stemcell: latest(),
        }
    }
}

impl ReleaseVersions {
    /// Returns `(variable, version)` pairs in the order they are passed to the
    /// deploy tool.
    #[must_use]
    pub fn as_deploy_vars(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("concourse_release_version", self.concourse.as_str()),
            ("garden_runc_release_version", self.garden_runc.as_str()),
            ("postgres_release_version", self.postgres.as_str()),
            ("git_server_release_version", self.git_server.as_str()),
            ("vault_release_version", self.vault.as_str()),
            ("credhub_release_version", self.credhub.as_str()),
            ("stemcell_version", self.stemcell.as_str()),
        ]
    }
}

/// Typed harness configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Release versions forwarded to the deploy tool.
    pub releases: ReleaseVersions,
    /// Deploy tool program.
    pub deploy_tool: PathBuf,
    /// Wrapped CLI binary.
    pub fly_binary: PathBuf,
    /// First lane index handed out by the lane allocator.
    pub lane_base: u32,
    /// Wait after bring-up for control-plane bootstrap.
    pub warmup: Duration,
    /// Optional minimum for convergence timeouts.
    pub timeout_override: Option<Duration>,
    /// Username for the deployed system.
    pub atc_username: String,
    /// Password for the deployed system.
    pub atc_password: String,
    /// Job hosting the public web endpoint.
    pub web_job: String,
    /// Job hosting the backing data store.
    pub db_job: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            releases: ReleaseVersions::default(),
            deploy_tool: PathBuf::from("bosh"),
            fly_binary: PathBuf::from("fly"),
            lane_base: 1,
            warmup: Duration::from_secs(DEFAULT_WARMUP_SECS),
            timeout_override: None,
            atc_username: "test".to_string(),
            atc_password: "test".to_string(),
            web_job: "web".to_string(),
            db_job: "postgres".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when a value is not valid UTF-8, is
    /// empty (release versions excepted), or fails validation.
    pub fn load() -> HarnessResult<Self> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Loads configuration through the provided variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when a value is not valid UTF-8, is
    /// empty (release versions excepted), or fails validation.
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let defaults = Self::default();
        let read = |key: HarnessEnv| read_nonempty(&lookup, key.as_str());
        // Blank release versions mean "unset".
        let version = |key: HarnessEnv| -> HarnessResult<String> {
            Ok(read_strict(&lookup, key.as_str())?
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_RELEASE_VERSION.to_string()))
        };
        let releases = ReleaseVersions {
            concourse: version(HarnessEnv::ConcourseRelease)?,
            garden_runc: version(HarnessEnv::GardenRuncRelease)?,
            postgres: version(HarnessEnv::PostgresRelease)?,
            git_server: version(HarnessEnv::GitServerRelease)?,
            vault: version(HarnessEnv::VaultRelease)?,
            credhub: version(HarnessEnv::CredhubRelease)?,
            stemcell: version(HarnessEnv::Stemcell)?,
        };
        let lane_base = read(HarnessEnv::Lane)?
            .map(|raw| parse_positive(HarnessEnv::Lane.as_str(), &raw))
            .transpose()?
            .map_or(defaults.lane_base, |lane| u32::try_from(lane).unwrap_or(u32::MAX));
        let warmup = read(HarnessEnv::WarmupSeconds)?
            .map(|raw| parse_seconds(HarnessEnv::WarmupSeconds.as_str(), &raw))
            .transpose()?
            .unwrap_or(defaults.warmup);
        let timeout_override = read(HarnessEnv::TimeoutSeconds)?
            .map(|raw| {
                parse_positive(HarnessEnv::TimeoutSeconds.as_str(), &raw).map(Duration::from_secs)
            })
            .transpose()?;
        Ok(Self {
            releases,
            deploy_tool: read(HarnessEnv::DeployTool)?
                .map_or(defaults.deploy_tool, PathBuf::from),
            fly_binary: read(HarnessEnv::FlyBinary)?.map_or(defaults.fly_binary, PathBuf::from),
            lane_base,
            warmup,
            timeout_override,
            atc_username: read(HarnessEnv::AtcUsername)?.unwrap_or(defaults.atc_username),
            atc_password: read(HarnessEnv::AtcPassword)?.unwrap_or(defaults.atc_password),
            web_job: read(HarnessEnv::WebJob)?.unwrap_or(defaults.web_job),
            db_job: read(HarnessEnv::DbJob)?.unwrap_or(defaults.db_job),
        })
    }
}

// ============================================================================
// SECTION: Cloud Credentials
// ============================================================================

/// Optional cloud credentials for parameter-store scenarios.
///
/// # Invariants
/// - Absence of a required value yields `None`, never an error, so dependent
///   scenarios skip instead of failing.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudCredentials {
    /// Region hosting the parameter store.
    pub region: String,
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Optional session token.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CloudCredentials {
    /// Region variable.
    pub const REGION: &'static str = "AWS_SSM_REGION";
    /// Access key variable.
    pub const ACCESS_KEY_ID: &'static str = "AWS_SSM_ACCESS_KEY_ID";
    /// Secret key variable.
    pub const SECRET_ACCESS_KEY: &'static str = "AWS_SSM_SECRET_ACCESS_KEY";
    /// Session token variable.
    pub const SESSION_TOKEN: &'static str = "AWS_SSM_SESSION_TOKEN";

    /// Loads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when a value is not valid UTF-8.
    pub fn load() -> HarnessResult<Option<Self>> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Loads credentials through the provided variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when a value is not valid UTF-8.
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Option<Self>>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let read = |name: &str| -> HarnessResult<Option<String>> {
            Ok(read_strict(&lookup, name)?.filter(|value| !value.trim().is_empty()))
        };
        let (Some(region), Some(access_key_id), Some(secret_access_key)) =
            (read(Self::REGION)?, read(Self::ACCESS_KEY_ID)?, read(Self::SECRET_ACCESS_KEY)?)
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            region,
            access_key_id,
            secret_access_key,
            session_token: read(Self::SESSION_TOKEN)?,
        }))
    }

    /// Message shown when a scenario skips for lack of credentials.
    #[must_use]
    pub fn skip_reason() -> String {
        format!(
            "must set ${}, ${}, ${}, and optionally ${} to run parameter store scenarios",
            Self::REGION,
            Self::ACCESS_KEY_ID,
            Self::SECRET_ACCESS_KEY,
            Self::SESSION_TOKEN
        )
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn read_strict<F>(lookup: &F, name: &str) -> HarnessResult<Option<String>>
where
    F: Fn(&str) -> Option<OsString>,
{
    lookup(name).map_or(Ok(None), |raw| {
        raw.into_string()
            .map(Some)
            .map_err(|_| HarnessError::Config(format!("{name} must be valid UTF-8")))
    })
}

/// Reads a variable and rejects empty values.
fn read_nonempty<F>(lookup: &F, name: &str) -> HarnessResult<Option<String>>
where
    F: Fn(&str) -> Option<OsString>,
{
    match read_strict(lookup, name)? {
        Some(value) if value.trim().is_empty() => {
            Err(HarnessError::Config(format!("{name} must not be empty")))
        }
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

/// Parses a positive integer.
fn parse_positive(name: &str, raw: &str) -> HarnessResult<u64> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("{name} must be a positive integer")))?;
    if value == 0 {
        return Err(HarnessError::Config(format!("{name} must be greater than zero")));
    }
    Ok(value)
}

/// Parses a non-negative number of seconds.
fn parse_seconds(name: &str, raw: &str) -> HarnessResult<Duration> {
    raw.trim().parse().map(Duration::from_secs).map_err(|_| {
        HarnessError::Config(format!("{name} must be a non-negative integer number of seconds"))
    })
}
