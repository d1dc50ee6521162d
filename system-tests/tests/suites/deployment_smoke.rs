// system-tests/tests/suites/deployment_smoke.rs
// ============================================================================
// Module: Deployment Smoke Scenarios
// Description: Bring-up of the standard single-worker deployment.
// Purpose: Prove the registry, database, and worker convergence paths.
// Dependencies: system-tests, topgun-harness
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use system_tests::support;
use system_tests::support::asset;
use system_tests::support::ensure;
use system_tests::support::ops;
use topgun_harness::HarnessError;
use topgun_harness::HarnessResult;
use topgun_harness::ScenarioContext;
use topgun_harness::workers;

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_deployment_converges() -> HarnessResult<()> {
    support::run("single_worker_deployment_converges", async |ctx: &mut ScenarioContext| {
        ctx.controller_mut().deploy(asset("deployments/concourse.yml"), &[]).await?;

        let registry = ctx.controller().registry();
        ensure(registry.job_instance("atc").is_some(), "no atc instance")?;
        let store = ctx
            .controller()
            .datastore()
            .ok_or_else(|| HarnessError::violation("database connection missing"))?;
        store.ping().await?;

        let name = workers::wait_for_running_worker(ctx.fly(), ctx.poller()).await?;
        tracing::info!(worker = %name, "worker registered");

        let fly = ctx.fly();
        let window = Duration::from_secs(10);
        let interval = Duration::from_secs(1);
        ctx.poller()
            .hold_for("worker stays running", window, interval, || async move {
                let rows = fly.table(&["workers"]).await?;
                Ok(workers::all_running(&rows))
            })
            .await
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn two_worker_deployment_spreads_addresses() -> HarnessResult<()> {
    support::run("two_worker_deployment_spreads_addresses", async |ctx: &mut ScenarioContext| {
        ctx.controller_mut()
            .deploy(asset("deployments/concourse-separate-forwarded-worker.yml"), &[ops(
                "separate-worker-two.yml",
            )])
            .await?;

        let addresses: BTreeSet<_> = ctx
            .controller()
            .registry()
            .job_instances("worker")
            .iter()
            .map(topgun_harness::Instance::address)
            .collect();
        ensure(
            addresses.len() == 2,
            format!("expected 2 worker addresses, got {}", addresses.len()),
        )?;

        workers::wait_for_worker_count(ctx.fly(), ctx.poller(), 2).await?;
        workers::wait_for_workers_to_be_running(ctx.fly(), ctx.poller()).await
    })
    .await
}
