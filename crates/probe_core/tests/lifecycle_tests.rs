//! End-to-end lifecycle tests with scripted terraform and resource API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use probe_azure::{ApiOperation, MockResourceApi, ResourceApi};
use probe_core::{
    CheckName, FailureKind, LifecycleState, Probe, ProbeConfig, ProbeError, RetryConfig, RunReport,
};
use probe_iac::{IacResult, InputVariables, OutputKey, ProvisioningTool, TerraformRunner, TerraformTimeouts};
use probe_runner::{MockResponse, MockRunner};

mock! {
    pub Tool {}

    #[async_trait::async_trait]
    impl ProvisioningTool for Tool {
        async fn apply(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()>;
        async fn output(&self, working_dir: &Path, key: &str) -> IacResult<String>;
        async fn destroy(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()>;
    }
}

fn env() -> HashMap<String, String> {
    [
        ("subscription", "sub-123"),
        ("client_id", "client"),
        ("client_secret", "hunter2"),
        ("tenant_id", "tenant"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn config() -> ProbeConfig {
    ProbeConfig {
        teardown: RetryConfig::immediate(3),
        verification: RetryConfig::immediate(5),
        ..Default::default()
    }
}

/// Terraform that applies cleanly and reports the outputs of account `sa1`.
fn healthy_terraform() -> MockRunner {
    MockRunner::new()
        .respond_output(OutputKey::ResourceGroupName.as_str(), MockResponse::success("\"rg1\"\n"))
        .respond_output(OutputKey::StorageAccountName.as_str(), MockResponse::success("\"sa1\"\n"))
        .respond_output(
            OutputKey::StorageAccountAccountTier.as_str(),
            MockResponse::success("\"Standard\"\n"),
        )
        .respond_output(
            OutputKey::StorageAccountAccountKind.as_str(),
            MockResponse::success("\"StorageV2\"\n"),
        )
        .respond_output(OutputKey::StorageContainerName.as_str(), MockResponse::success("\"data\"\n"))
        .respond_output(OutputKey::StorageFileshareName.as_str(), MockResponse::success("\"share\"\n"))
}

fn probe_with(runner: &MockRunner, config: ProbeConfig) -> Probe {
    let tf = TerraformRunner::new(Arc::new(runner.clone())).with_timeouts(config.timeouts.terraform());
    Probe::new(config, Arc::new(tf))
}

async fn run(runner: &MockRunner, api: &MockResourceApi, cancel: CancellationToken) -> RunReport {
    let dir = TempDir::new().unwrap();
    let api = api.clone();
    probe_with(runner, config())
        .execute(
            &env(),
            dir.path(),
            move |_| Ok(Arc::new(api) as Arc<dyn ResourceApi>),
            cancel,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_healthy_run_passes_and_tears_down() {
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(report.state, LifecycleState::TornDown);
    assert_eq!(report.outputs.as_ref().unwrap().storage_account_name(), "sa1");
    assert!(report.verification.as_ref().unwrap().passed());
    assert_eq!(runner.count_for("init"), 1);
    assert_eq!(runner.count_for("apply"), 1);
    assert_eq!(runner.count_for("output"), 6);
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_run_id_and_credentials_reach_terraform() {
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    let apply = &runner.calls_for("apply")[0];
    assert_eq!(
        apply.env.get("TF_VAR_postfix").map(String::as_str),
        Some(report.run_id.as_str())
    );
    assert_eq!(apply.env.get("TF_VAR_subscription").map(String::as_str), Some("sub-123"));

    let destroy = &runner.calls_for("destroy")[0];
    assert_eq!(destroy.env.get("TF_VAR_postfix"), apply.env.get("TF_VAR_postfix"));
}

#[tokio::test]
async fn test_apply_failure_tears_down_once() {
    let runner = healthy_terraform().respond("apply", MockResponse::failure(1, "Error: quota exceeded"));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::ProvisioningFailure));
    assert!(report.failure.as_ref().unwrap().message.contains("quota exceeded"));
    assert_eq!(runner.count_for("output"), 0);
    assert_eq!(runner.count_for("destroy"), 1);
    assert_eq!(api.total_calls(), 0);
    assert!(report.teardown.succeeded);
}

#[tokio::test]
async fn test_collection_failure_tears_down_once() {
    let runner = healthy_terraform().respond_output(
        OutputKey::StorageFileshareName.as_str(),
        MockResponse::failure(1, "Error: Output \"storage_fileshare_name\" not found"),
    );
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::ProvisioningFailure));
    assert!(report.outputs.is_none());
    assert_eq!(runner.count_for("destroy"), 1);
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn test_malformed_output_tears_down_once() {
    let runner = healthy_terraform().respond_output(
        OutputKey::StorageAccountName.as_str(),
        MockResponse::success("{\"value\": "),
    );
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::MalformedOutput));
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_verification_failure_tears_down_once_and_reports_every_check() {
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "Storage", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::VerificationMismatch));
    let verification = report.verification.as_ref().unwrap();
    assert_eq!(verification.checks.len(), 7);
    assert_eq!(verification.failed_names(), vec!["account_kind_matches"]);
    assert!(verification.get(CheckName::SkuTierMatches).unwrap().passed);
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_teardown_failure_is_distinct_and_bounded() {
    let runner = healthy_terraform().respond("destroy", MockResponse::failure(1, "Error: lock held"));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert!(!report.passed());
    assert_eq!(report.failure_kind(), Some(FailureKind::TeardownFailure));
    assert_eq!(report.teardown.attempts, 3);
    assert!(!report.teardown.succeeded);
    assert!(report.teardown.error.as_deref().unwrap_or_default().contains("lock held"));
    assert_eq!(runner.count_for("destroy"), 3);
}

#[tokio::test]
async fn test_teardown_failure_does_not_mask_verification_failure() {
    let runner = healthy_terraform().respond("destroy", MockResponse::failure(1, "Error: lock held"));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Premium");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::VerificationMismatch));
    assert!(report.leaked_resources());
}

#[tokio::test]
async fn test_destroy_recovers_within_budget() {
    let runner = healthy_terraform()
        .respond("destroy", MockResponse::failure(1, "Error: still deleting"))
        .respond("destroy", MockResponse::success(""));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert!(report.passed());
    assert_eq!(report.teardown.attempts, 2);
}

#[tokio::test]
async fn test_cancellation_still_tears_down() {
    let runner = healthy_terraform().respond("apply", MockResponse::success("").with_duration(10_000));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = run(&runner, &api, cancel).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::Cancelled));
    assert_eq!(report.state, LifecycleState::TornDown);
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_run_deadline_still_tears_down() {
    let runner = healthy_terraform().respond("apply", MockResponse::success("").with_duration(10_000));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");
    let dir = TempDir::new().unwrap();

    let probe = probe_with(&runner, config());
    let ctx = probe.prepare(&env(), dir.path()).unwrap();
    let report = probe
        .controller(Arc::new(api))
        .with_run_deadline(Some(Duration::from_millis(100)))
        .run(&ctx, CancellationToken::new())
        .await;

    assert_eq!(report.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_apply_timeout_is_reported_as_timeout() {
    let runner = healthy_terraform().respond("apply", MockResponse::success("").with_duration(5_000));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");
    let dir = TempDir::new().unwrap();

    let mut config = config();
    config.timeouts.apply = 1;
    let report = probe_with(&runner, config)
        .execute(
            &env(),
            dir.path(),
            move |_| Ok(Arc::new(api) as Arc<dyn ResourceApi>),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.failure_kind(), Some(FailureKind::Timeout));
    assert!(report.failure.as_ref().unwrap().message.starts_with("apply timed out"));
    assert_eq!(runner.count_for("destroy"), 1);
}

#[tokio::test]
async fn test_propagation_delay_is_absorbed() {
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard")
        .stale_times(ApiOperation::ContainerExists, 2)
        .fail_times(ApiOperation::BlobEndpoint, 2);

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert!(report.passed());
    let verification = report.verification.as_ref().unwrap();
    assert_eq!(verification.get(CheckName::ContainerExists).unwrap().attempts, 3);
    assert_eq!(verification.get(CheckName::BlobEndpointMatches).unwrap().attempts, 3);
}

#[tokio::test]
async fn test_missing_credential_never_invokes_tool() {
    let mut tool = MockTool::new();
    tool.expect_apply().times(0);
    tool.expect_output().times(0);
    tool.expect_destroy().times(0);

    let mut env = env();
    env.remove("client_secret");
    let dir = TempDir::new().unwrap();

    let probe = Probe::new(config(), Arc::new(tool));
    let err = probe
        .execute(
            &env,
            dir.path(),
            |_| Ok(Arc::new(MockResourceApi::healthy("sa1", "StorageV2", "Standard")) as Arc<dyn ResourceApi>),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::MissingConfiguration(ref m) if m.contains("client_secret")));
}

#[tokio::test]
async fn test_missing_working_directory_is_rejected_before_provisioning() {
    let runner = healthy_terraform();
    let probe = probe_with(&runner, config());

    let err = probe
        .prepare(&env(), Path::new("/definitely/not/here"))
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::MissingConfiguration);
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_get_distinct_ids() {
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let reports = futures_util::future::join_all(
        (0..4).map(|_| run(&runner, &api, CancellationToken::new())),
    )
    .await;

    let mut ids: Vec<_> = reports.iter().map(|r| r.run_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert!(reports.iter().all(|r| r.passed()));
    assert_eq!(runner.count_for("destroy"), 4);
}

async fn run_isolated(runner: &MockRunner, api: &MockResourceApi, source: &Path) -> RunReport {
    let api = api.clone();
    probe_with(runner, config())
        .execute_isolated(
            &env(),
            source,
            move |_| Ok(Arc::new(api) as Arc<dyn ResourceApi>),
            CancellationToken::new(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_isolated_run_removes_its_copy_after_clean_teardown() {
    let source = TempDir::new().unwrap();
    std::fs::write(source.path().join("main.tf"), "resource {}").unwrap();
    let runner = healthy_terraform();
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run_isolated(&runner, &api, source.path()).await;

    assert!(report.passed(), "{:?}", report.failure);
    assert!(report.teardown.state_dir.is_none());
    let workdir = runner.calls_for("apply")[0].workdir.clone().unwrap();
    assert_ne!(workdir, source.path());
    assert!(!workdir.exists());
}

#[tokio::test]
async fn test_isolated_run_keeps_state_when_destroy_fails() {
    let source = TempDir::new().unwrap();
    std::fs::write(source.path().join("main.tf"), "resource {}").unwrap();
    let runner = MockRunner::new()
        .respond("apply", MockResponse::failure(1, "Error: creating Storage Account"))
        .respond("destroy", MockResponse::failure(1, "Error: lock held"));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run_isolated(&runner, &api, source.path()).await;

    assert!(report.leaked_resources());
    assert_eq!(report.failure_kind(), Some(FailureKind::ProvisioningFailure));
    let state_dir = report.teardown.state_dir.clone().unwrap();
    assert_eq!(Some(&state_dir), runner.calls_for("destroy")[0].workdir.as_ref());
    assert!(state_dir.join("main.tf").is_file());

    std::fs::remove_dir_all(&state_dir).unwrap();
}

#[tokio::test]
async fn test_teardown_failure_records_state_dir() {
    let runner = healthy_terraform().respond("destroy", MockResponse::failure(1, "Error: lock held"));
    let api = MockResourceApi::healthy("sa1", "StorageV2", "Standard");

    let report = run(&runner, &api, CancellationToken::new()).await;

    assert_eq!(
        report.teardown.state_dir.as_ref(),
        runner.calls_for("destroy")[0].workdir.as_ref()
    );
}

#[tokio::test]
async fn test_tool_mock_sees_lowercase_postfix() {
    let mut tool = MockTool::new();
    tool.expect_apply()
        .withf(|_, vars| vars.get("postfix").map_or(false, |p| p == p.to_lowercase()))
        .times(1)
        .returning(|_, _| Ok(()));
    tool.expect_output().returning(|_, key| {
        Ok(match key {
            "storage_account_name" => "\"sa1\"".to_string(),
            "storage_account_account_kind" => "\"StorageV2\"".to_string(),
            "storage_account_account_tier" => "\"Standard\"".to_string(),
            other => format!("\"{}\"", other),
        })
    });
    tool.expect_destroy().times(1).returning(|_, _| Ok(()));

    let dir = TempDir::new().unwrap();
    let probe = Probe::new(config(), Arc::new(tool));
    let report = probe
        .execute(
            &env(),
            dir.path(),
            |_| Ok(Arc::new(MockResourceApi::healthy("sa1", "StorageV2", "Standard")) as Arc<dyn ResourceApi>),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.passed(), "{:?}", report.failure);
}

#[test]
fn test_terraform_timeouts_follow_config() {
    let config = ProbeConfig::default();
    let TerraformTimeouts { apply, destroy, .. } = config.timeouts.terraform();
    assert_eq!(apply, 1800);
    assert_eq!(destroy, 1800);
}
