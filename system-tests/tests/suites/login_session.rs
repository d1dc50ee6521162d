// system-tests/tests/suites/login_session.rs
// ============================================================================
// Module: Login Session Scenarios
// Description: Tokens and auth storage shared between two web instances.
// Purpose: Pin that either web instance honours the other's tokens.
// Dependencies: sqlx, system-tests, topgun-harness
// ============================================================================

use std::net::SocketAddr;

use system_tests::support;
use system_tests::support::asset;
use system_tests::support::ensure;
use topgun_harness::AuthenticatedClient;
use topgun_harness::HarnessError;
use topgun_harness::HarnessResult;
use topgun_harness::Instance;
use topgun_harness::ScenarioContext;
use topgun_harness::deploy::WEB_PORT;
use topgun_harness::workers;

const TWO_ATCS: &str = "deployments/concourse-two-atcs-slow-tracking.yml";

fn web_url(instance: &Instance) -> String {
    format!("http://{}", SocketAddr::new(instance.address(), WEB_PORT))
}

async fn two_atcs(ctx: &mut ScenarioContext) -> HarnessResult<Vec<Instance>> {
    ctx.controller_mut().deploy(asset(TWO_ATCS), &[]).await?;
    workers::wait_for_running_worker(ctx.fly(), ctx.poller()).await?;
    let atcs = ctx.controller().registry().job_instances("atc").to_vec();
    ensure(atcs.len() == 2, format!("expected 2 atc instances, got {}", atcs.len()))?;
    Ok(atcs)
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_storage_lives_in_one_schema() -> HarnessResult<()> {
    support::run("auth_storage_lives_in_one_schema", async |ctx: &mut ScenarioContext| {
        two_atcs(ctx).await?;
        let pool = ctx
            .controller()
            .datastore()
            .ok_or_else(|| HarnessError::violation("database connection missing"))?
            .pool();

        let schema: String = sqlx::query_scalar(
            "SELECT table_schema FROM information_schema.tables WHERE table_name = $1",
        )
        .bind("auth_request")
        .fetch_one(pool)
        .await?;
        ensure(schema == "dex", format!("auth tables live in schema {schema}"))?;

        let clients: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM dex.client").fetch_one(pool).await?;
        ensure(clients == 1, format!("expected one shared auth client, found {clients}"))
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn token_from_stopped_atc_works_on_the_other() -> HarnessResult<()> {
    support::run("token_from_stopped_atc_works_on_the_other", async |ctx: &mut ScenarioContext| {
        let atcs = two_atcs(ctx).await?;
        let controller = ctx.controller();
        let credentials = controller.credentials().clone();
        let token = controller
            .auth()
            .fetch_token(&web_url(&atcs[0]), &credentials.username, &credentials.password)
            .await?;

        controller.stop_instance(atcs[0].name()).await?;
        let outcome = async {
            let client = AuthenticatedClient::new(&web_url(&atcs[1]), token)?;
            client.list_workers().await.map(|_| ())
        }
        .await;
        controller.start_instance(atcs[0].name()).await?;
        outcome
    })
    .await
}
