// crates/topgun-harness/src/deploy/mod.rs
// ============================================================================
// Module: Deployment Controller
// Description: Drives the external deploy tool through a full bring-up.
// Purpose: Leave a scenario with a fresh registry, endpoint, and database.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`DeploymentController::deploy`] runs the bring-up in a fixed order:
//!
//! 1. stop the previous log tail and close the previous database pool;
//! 2. run the deploy tool and require exit code zero;
//! 3. refresh the [`InstanceRegistry`];
//! 4. start a new log tail;
//! 5. wait out the warm-up interval;
//! 6. resolve the web endpoint from the registry;
//! 7. wait (bounded) until a token exchange succeeds, then log the CLI in;
//! 8. connect to the database job.
//!
//! Every failure is a [`HarnessError::Setup`] naming its stage. Only step 7
//! retries, and only until its reachability deadline. A missing web or
//! database job skips steps 6–8 for that job with a warning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AuthClient;
use crate::auth::AuthenticatedClient;
use crate::config::HarnessConfig;
use crate::datastore::DataStore;
use crate::error::ErrorKind;
use crate::error::HarnessError;
use crate::error::HarnessResult;
use crate::fly::FlyCli;
use crate::lane::Lane;
use crate::poll::PollOutcome;
use crate::poll::PollPolicy;
use crate::poll::poll_until;
use crate::registry::InstanceRegistry;
use crate::session::Session;
use crate::session::SessionManager;
use crate::session::SessionSignal;

mod tool;

pub use tool::DeployArg;
pub use tool::DeployTool;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Port the web job serves the API on.
pub const WEB_PORT: u16 = 8080;

/// Deadline for the post-deploy reachability loop.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the post-deploy reachability loop.
const REACHABILITY_INTERVAL: Duration = Duration::from_secs(1);

/// Grace given to the log tail after an interrupt.
const LOG_TAIL_GRACE: Duration = Duration::from_secs(10);

/// Setup stage labels.
const STAGE_DEPLOY: &str = "deploy";
const STAGE_REGISTRY: &str = "registry";
const STAGE_LOG_TAIL: &str = "log-tail";
const STAGE_AUTH: &str = "auth";
const STAGE_DATASTORE: &str = "datastore";

// ============================================================================
// SECTION: Deployment
// ============================================================================

/// The manifest and overrides of the most recent deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Manifest path.
    pub manifest: PathBuf,
    /// Ordered overrides.
    pub args: Vec<DeployArg>,
}

/// Username and password used against the deployed system.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Owns one lane's deployment and everything derived from it.
#[derive(Debug)]
pub struct DeploymentController {
    lane: Lane,
    config: HarnessConfig,
    tool: DeployTool,
    sessions: SessionManager,
    auth: AuthClient,
    fly: Option<FlyCli>,
    credentials: Credentials,
    web_port: u16,
    reachability: PollPolicy,
    registry: InstanceRegistry,
    deployment: Option<Deployment>,
    log_tail: Option<Session>,
    endpoint: Option<String>,
    datastore: Option<DataStore>,
}

impl DeploymentController {
    /// Creates a controller for `lane` with nothing deployed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Http`] when the auth client cannot be built.
    pub fn new(lane: Lane, config: HarnessConfig, sessions: SessionManager) -> HarnessResult<Self> {
        let tool =
            DeployTool::new(&config.deploy_tool, lane.deployment_name(), config.releases.clone());
        let credentials = Credentials {
            username: config.atc_username.clone(),
            password: config.atc_password.clone(),
        };
        Ok(Self {
            lane,
            tool,
            sessions,
            auth: AuthClient::new()?,
            fly: None,
            credentials,
            web_port: WEB_PORT,
            reachability: PollPolicy::new(REACHABILITY_TIMEOUT, REACHABILITY_INTERVAL),
            registry: InstanceRegistry::new(),
            deployment: None,
            log_tail: None,
            endpoint: None,
            datastore: None,
            config,
        })
    }

    /// Logs the given CLI in after every successful reachability check.
    #[must_use]
    pub fn with_fly(mut self, fly: FlyCli) -> Self {
        self.fly = Some(fly);
        self
    }

    /// Overrides the port the web endpoint is resolved on.
    #[must_use]
    pub const fn with_web_port(mut self, port: u16) -> Self {
        self.web_port = port;
        self
    }

    /// Overrides the reachability loop policy.
    #[must_use]
    pub const fn with_reachability(mut self, policy: PollPolicy) -> Self {
        self.reachability = policy;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns the lane this controller deploys into.
    #[must_use]
    pub const fn lane(&self) -> &Lane {
        &self.lane
    }

    /// Returns the harness configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the deploy tool renderer.
    #[must_use]
    pub const fn tool(&self) -> &DeployTool {
        &self.tool
    }

    /// Returns the session manager used for every tool invocation.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Returns the auth client.
    #[must_use]
    pub const fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Returns the CLI wrapper, if one is attached.
    #[must_use]
    pub const fn fly(&self) -> Option<&FlyCli> {
        self.fly.as_ref()
    }

    /// Returns the instance snapshot from the last refresh.
    #[must_use]
    pub const fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Returns the most recent deployment.
    #[must_use]
    pub const fn deployment(&self) -> Option<&Deployment> {
        self.deployment.as_ref()
    }

    /// Returns the resolved web endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the open database pool.
    #[must_use]
    pub const fn datastore(&self) -> Option<&DataStore> {
        self.datastore.as_ref()
    }

    /// Returns the live log tail.
    #[must_use]
    pub const fn log_tail(&self) -> Option<&Session> {
        self.log_tail.as_ref()
    }

    /// Returns the credentials used against the deployment.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replaces the credentials used by later deploys and clients.
    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.credentials = Credentials {
            username: username.into(),
            password: password.into(),
        };
    }

    // ------------------------------------------------------------------------
    // Bring-up
    // ------------------------------------------------------------------------

    /// Fully redeploys `manifest` with `args` and re-derives every piece of
    /// deployment state.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] naming the failed stage. The deploy
    /// tool's captured output is part of the message.
    pub async fn deploy(
        &mut self,
        manifest: impl AsRef<Path>,
        args: &[DeployArg],
    ) -> HarnessResult<()> {
        let manifest = manifest.as_ref();
        self.stop_log_tail().await;
        self.close_datastore().await;
        self.endpoint = None;

        let session =
            self.start_deploy(manifest, args).map_err(|err| err.into_setup(STAGE_DEPLOY))?;
        self.sessions.wait(&session).await.map_err(|err| err.into_setup(STAGE_DEPLOY))?;
        self.deployment = Some(Deployment {
            manifest: manifest.to_path_buf(),
            args: args.to_vec(),
        });

        self.refresh_registry().await.map_err(|err| err.into_setup(STAGE_REGISTRY))?;

        let tail = self
            .sessions
            .spawn(self.tool.program(), self.tool.logs_args())
            .map_err(|err| err.into_setup(STAGE_LOG_TAIL))?;
        self.log_tail = Some(tail);

        if !self.config.warmup.is_zero() {
            tracing::info!(warmup = ?self.config.warmup, "waiting for control plane bootstrap");
            tokio::time::sleep(self.config.warmup).await;
        }

        self.connect_web().await?;
        self.connect_datastore().await?;
        tracing::info!(deployment = self.tool.deployment(), "deployment ready");
        Ok(())
    }

    /// Spawns a deploy without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the tool cannot be started.
    pub fn start_deploy(&self, manifest: &Path, args: &[DeployArg]) -> HarnessResult<Session> {
        self.sessions.spawn(self.tool.program(), self.tool.deploy_args(manifest, args))
    }

    /// Rebuilds the registry from the deploy tool's instance listing.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] when the listing fails.
    pub async fn refresh_registry(&mut self) -> HarnessResult<()> {
        let listing = self.sessions.run(self.tool.program(), self.tool.instances_args()).await?;
        self.registry.refresh(&listing.stdout().text());
        tracing::debug!(
            groups = ?self.registry.group_names(),
            jobs = ?self.registry.job_names(),
            "registry refreshed"
        );
        Ok(())
    }

    /// Adopts whatever is already deployed under this lane's name: refreshes
    /// the registry and resolves the web endpoint without redeploying.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] naming the failed stage.
    pub async fn attach(&mut self) -> HarnessResult<()> {
        self.refresh_registry().await.map_err(|err| err.into_setup(STAGE_REGISTRY))?;
        self.connect_web().await
    }

    async fn connect_web(&mut self) -> HarnessResult<()> {
        let Some(web) = self.registry.job_instance(&self.config.web_job) else {
            tracing::warn!(
                job = %self.config.web_job,
                "no web instance; skipping endpoint and auth"
            );
            return Ok(());
        };
        let endpoint = format!("http://{}", SocketAddr::new(web.address(), self.web_port));
        self.await_reachable(&endpoint).await.map_err(|err| err.into_setup(STAGE_AUTH))?;
        if let Some(fly) = &self.fly {
            fly.login(&endpoint, &self.credentials.username, &self.credentials.password)
                .await
                .map_err(|err| err.into_setup(STAGE_AUTH))?;
        }
        self.endpoint = Some(endpoint);
        Ok(())
    }

    async fn await_reachable(&self, endpoint: &str) -> HarnessResult<()> {
        let auth = &self.auth;
        let credentials = &self.credentials;
        poll_until("deployment endpoint reachable", self.reachability, || async move {
            match auth.fetch_token(endpoint, &credentials.username, &credentials.password).await {
                Ok(_) => Ok(PollOutcome::Satisfied(())),
                Err(err) if err.kind() == ErrorKind::Authentication => {
                    Ok(PollOutcome::pending(err.to_string()))
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    async fn connect_datastore(&mut self) -> HarnessResult<()> {
        let Some(db) = self.registry.job_instance(&self.config.db_job) else {
            tracing::warn!(job = %self.config.db_job, "no database instance; skipping connection");
            return Ok(());
        };
        let store =
            DataStore::connect(db.address()).await.map_err(|err| err.into_setup(STAGE_DATASTORE))?;
        self.datastore = Some(store);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------------

    /// Builds an API client with a freshly exchanged token.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when nothing is deployed yet, or the
    /// errors of [`AuthClient::build_client`].
    pub async fn client(&self) -> HarnessResult<AuthenticatedClient> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| HarnessError::setup(STAGE_AUTH, "no web endpoint has been resolved"))?;
        self.auth
            .build_client(endpoint, &self.credentials.username, &self.credentials.password)
            .await
    }

    // ------------------------------------------------------------------------
    // Instance lifecycle
    // ------------------------------------------------------------------------

    /// Stops an instance. The registry is not refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] on a non-zero exit.
    pub async fn stop_instance(&self, instance: &str) -> HarnessResult<()> {
        self.sessions.run(self.tool.program(), self.tool.stop_args(instance)).await?;
        Ok(())
    }

    /// Starts an instance. The registry is not refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] on a non-zero exit.
    pub async fn start_instance(&self, instance: &str) -> HarnessResult<()> {
        self.sessions.run(self.tool.program(), self.tool.start_args(instance)).await?;
        Ok(())
    }

    /// Spawns a remote command on an instance without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the tool cannot be started.
    pub fn ssh(&self, instance: &str, command: &str) -> HarnessResult<Session> {
        self.sessions.spawn(self.tool.program(), self.tool.ssh_args(instance, command))
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Interrupts the log tail and waits for it to exit.
    pub async fn stop_log_tail(&mut self) {
        let Some(tail) = self.log_tail.take() else {
            return;
        };
        tail.signal(SessionSignal::Interrupt);
        if tail.wait_timeout(LOG_TAIL_GRACE).await.is_err() {
            tracing::warn!(session = tail.id(), "log tail ignored interrupt; killing");
            self.sessions.terminate(&tail, SessionSignal::Kill).await;
        }
    }

    /// Closes the database pool, if open.
    pub async fn close_datastore(&mut self) {
        if let Some(store) = self.datastore.take() {
            store.close().await;
        }
    }

    /// Deletes the deployment. Runs even when nothing was deployed by this
    /// controller, so leaked deployments from earlier runs are removed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] on a non-zero exit.
    pub async fn delete_deployment(&mut self) -> HarnessResult<()> {
        self.sessions.run(self.tool.program(), self.tool.delete_args()).await?;
        self.deployment = None;
        self.endpoint = None;
        self.registry = InstanceRegistry::new();
        Ok(())
    }
}
