// system-tests/tests/suites/ephemeral_worker.rs
// ============================================================================
// Module: Ephemeral Worker Scenarios
// Description: Ephemeral workers vanish instead of stalling.
// Purpose: Pin worker deregistration when the runtime goes away.
// Dependencies: system-tests, topgun-harness
// ============================================================================

use system_tests::support;
use system_tests::support::asset;
use system_tests::support::ops;
use topgun_harness::HarnessResult;
use topgun_harness::ScenarioContext;
use topgun_harness::workers;

const STOP_WORKER: &str = "sudo /var/vcap/bosh/bin/monit stop worker";
const STOP_GARDEN: &str = "sudo /var/vcap/bosh/bin/monit stop garden";

#[tokio::test(flavor = "multi_thread")]
async fn ephemeral_worker_disappears_without_stalling() -> HarnessResult<()> {
    support::run("ephemeral_worker_disappears_without_stalling", async |ctx: &mut ScenarioContext| {
        ctx.controller_mut()
            .deploy(asset("deployments/concourse-separate-forwarded-worker.yml"), &[
                ops("separate-worker-two.yml"),
                ops("ephemeral-worker.yml"),
            ])
            .await?;
        workers::wait_for_worker_count(ctx.fly(), ctx.poller(), 2).await?;

        for command in [STOP_WORKER, STOP_GARDEN] {
            let session = ctx.controller().ssh("worker/0", command)?;
            ctx.controller().sessions().wait(&session).await?;
        }

        workers::wait_for_worker_count(ctx.fly(), ctx.poller(), 1).await
    })
    .await
}
