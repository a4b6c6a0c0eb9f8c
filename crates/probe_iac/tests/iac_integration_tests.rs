//! Integration tests for the IaC module.

use std::sync::Arc;

use probe_iac::{
    DeclaredOutputs, IacError, InputVariables, OutputKey, ProvisioningTool, TerraformRunner,
};
use probe_runner::{MockResponse, MockRunner};
use tempfile::tempdir;

fn scripted_outputs(mock: MockRunner) -> MockRunner {
    mock.respond_output("resource_group_name", MockResponse::success("\"rg-probe-ab12cd34\"\n"))
        .respond_output("storage_account_name", MockResponse::success("\"stab12cd34\"\n"))
        .respond_output("storage_account_account_tier", MockResponse::success("\"Standard\"\n"))
        .respond_output("storage_account_account_kind", MockResponse::success("\"StorageV2\"\n"))
        .respond_output("storage_container_name", MockResponse::success("\"data\"\n"))
        .respond_output("storage_fileshare_name", MockResponse::success("\"share\"\n"))
}

#[tokio::test]
async fn test_apply_collect_destroy_against_mock() {
    let dir = tempdir().unwrap();
    let mock = scripted_outputs(MockRunner::new());
    let tf = TerraformRunner::new(Arc::new(mock.clone()));
    let vars = InputVariables::new()
        .set("postfix", "ab12cd34")
        .set_secret("client_secret", "hunter2");

    tf.apply(dir.path(), &vars).await.unwrap();

    let mut declared = DeclaredOutputs::new();
    for key in OutputKey::ALL {
        declared.insert(key, tf.output(dir.path(), key.as_str()).await.unwrap());
    }
    let normalized = declared.normalize().unwrap();

    tf.destroy(dir.path(), &vars).await.unwrap();

    assert_eq!(normalized.storage_account_name(), "stab12cd34");
    assert_eq!(normalized.account_kind(), "StorageV2");
    assert_eq!(mock.count_for("output"), 6);
    assert_eq!(mock.count_for("destroy"), 1);

    let apply = &mock.calls_for("apply")[0];
    assert_eq!(apply.workdir.as_deref(), Some(dir.path()));
    assert_eq!(apply.env.get("TF_VAR_client_secret").map(String::as_str), Some("hunter2"));
    assert_eq!(apply.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_apply_failure_surfaces_last_error_line() {
    let dir = tempdir().unwrap();
    let mock = MockRunner::new().respond(
        "apply",
        MockResponse::failure(1, "Planning...\nError: creating Storage Account: StorageAccountAlreadyTaken"),
    );
    let tf = TerraformRunner::new(Arc::new(mock));

    let err = tf.apply(dir.path(), &InputVariables::new()).await.unwrap_err();

    match err {
        IacError::ApplyFailed(message) => {
            assert_eq!(message, "Error: creating Storage Account: StorageAccountAlreadyTaken")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_runner_timeout_maps_to_runner_error() {
    let dir = tempdir().unwrap();
    let mock = MockRunner::new().respond("init", MockResponse::success("").with_duration(2_000));
    let tf = TerraformRunner::new(Arc::new(mock)).with_timeouts(probe_iac::TerraformTimeouts {
        init: 1,
        ..Default::default()
    });

    let err = tf.apply(dir.path(), &InputVariables::new()).await.unwrap_err();
    assert!(matches!(err, IacError::Runner(probe_runner::RunnerError::Timeout(1))));
}

#[tokio::test]
async fn test_availability_check() {
    let mock = MockRunner::new().set_unavailable("terraform");
    let tf = TerraformRunner::new(Arc::new(mock.clone()));
    assert!(!tf.is_available().await.unwrap());

    let tf = TerraformRunner::new(Arc::new(mock)).with_binary("/opt/terraform/bin/terraform");
    assert!(tf.is_available().await.unwrap());
}
