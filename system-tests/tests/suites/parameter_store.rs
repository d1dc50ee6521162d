// system-tests/tests/suites/parameter_store.rs
// ============================================================================
// Module: Parameter Store Scenarios
// Description: Pipelines parameterized from a cloud parameter store.
// Purpose: Pin that secrets are resolved at runtime and never stored.
// Dependencies: regex, system-tests, topgun-harness
// ============================================================================

//! ## Overview
//! Assumes the parameters already exist under `/concourse-topgun/main/`.
//! Skips unless `AWS_SSM_REGION`, `AWS_SSM_ACCESS_KEY_ID`, and
//! `AWS_SSM_SECRET_ACCESS_KEY` are set.

use std::time::Duration;

use system_tests::support;
use system_tests::support::asset;
use system_tests::support::ensure;
use system_tests::support::ops;
use topgun_harness::CloudCredentials;
use topgun_harness::DeployArg;
use topgun_harness::HarnessResult;
use topgun_harness::ScenarioContext;

const PIPELINE: &str = "pipeline-ssm-test";

/// Values stored in the parameter store that must never appear in config.
const UNINTERPOLATED: [&str; 5] =
    ["concourse/time-resource", "10m", "Hello/World", "Sauce", "busybox"];

/// Lines the triggered job must print, in order.
const EXPECTED_OUTPUT: [&str; 5] = [
    "GET SECRET: GET-Hello/GET-World",
    "PUT SECRET: PUT-Hello/PUT-World",
    "GET SECRET: PUT-GET-Hello/PUT-GET-World",
    "SECRET: Hello/World",
    "TEAM SECRET: Sauce",
];

const BUILD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_is_parameterized_but_stored_uninterpolated() -> HarnessResult<()> {
    let credentials = CloudCredentials::load()?;
    let skip = credentials.is_none().then(CloudCredentials::skip_reason);
    let name = "pipeline_is_parameterized_but_stored_uninterpolated";
    support::run_unless(name, skip, async move |ctx: &mut ScenarioContext| {
        let Some(credentials) = credentials else {
            return Ok(());
        };
        ctx.controller_mut()
            .deploy(asset("deployments/concourse.yml"), &[
                ops("configure-ssm.yml"),
                DeployArg::var("aws_region", credentials.region.as_str()),
                DeployArg::var("aws_access_key", credentials.access_key_id.as_str()),
                DeployArg::var("aws_secret_key", credentials.secret_access_key.as_str()),
                DeployArg::var(
                    "aws_session_token",
                    credentials.session_token.clone().unwrap_or_default(),
                ),
            ])
            .await?;

        let fly = ctx.fly();
        let pipeline_config =
            asset("pipelines/credential-management.yml").to_string_lossy().into_owned();
        let config = pipeline_config.as_str();
        fly.run(&["set-pipeline", "-n", "-c", config, "-p", PIPELINE]).await?;
        let stored = fly.run(&["get-pipeline", "-p", PIPELINE]).await?.stdout().text();
        for value in UNINTERPOLATED {
            ensure(!stored.contains(value), format!("pipeline config contains `{value}`"))?;
        }
        fly.run(&["unpause-pipeline", "-p", PIPELINE]).await?;

        let job = format!("{PIPELINE}/job-with-custom-input");
        let watch = fly.spawn(&["trigger-job", "-w", "-j", job.as_str()])?;
        let watch = ctx.track(watch);
        let outcome = watch.wait_timeout(BUILD_TIMEOUT).await?;
        ensure(outcome.success(), format!("{job} finished with {outcome}"))?;
        let mut cursor = watch.stdout().cursor();
        for line in EXPECTED_OUTPUT {
            let found = cursor.say(&regex::escape(line))?.is_some();
            ensure(found, format!("build output missing `{line}`"))?;
        }
        Ok(())
    })
    .await
}

