//! BDD step definitions for the instance group.

use fleeting_plugin_cloudscale::compute::STATUS_RUNNING;
use fleeting_plugin_cloudscale::test_support::{FakeCompute, server_record};
use fleeting_plugin_cloudscale::{
    ConnectorSettings, GroupConfig, GroupError, InstanceGroup, Provider, State, TagMap,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{GroupWorld, render_reports, valid_config};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn initialised_group(
    group_world: &GroupWorld,
    runtime: &Runtime,
) -> Result<InstanceGroup<FakeCompute>, StepError> {
    let mut group = group_world.group();
    runtime
        .block_on(group.init(&CancellationToken::new(), ConnectorSettings::default()))
        .map_err(|err| StepError::Assertion(format!("init failed: {err}")))?;
    Ok(group)
}

#[given("a valid group configuration for \"{group}\"")]
fn valid_group_configuration(group_world: &GroupWorld, group: String) {
    group_world.observe(|observed| observed.config = valid_config(&group));
}

#[given("an empty group configuration")]
fn empty_group_configuration(group_world: &GroupWorld) {
    group_world.observe(|observed| observed.config = GroupConfig::default());
}

#[given("an untagged server \"{id}\" named \"{name}\"")]
fn untagged_server(group_world: &GroupWorld, id: String, name: String) {
    group_world
        .fake
        .insert_server(server_record(&id, &name, STATUS_RUNNING, TagMap::new()));
}

#[given("an owned server \"{id}\" named \"{name}\"")]
fn owned_server(group_world: &GroupWorld, id: String, name: String) {
    let tags = group_world.identity().tag_map();
    group_world
        .fake
        .insert_server(server_record(&id, &name, STATUS_RUNNING, tags));
}

#[given("owned servers with statuses \"{statuses}\"")]
fn owned_servers_with_statuses(
    group_world: &GroupWorld,
    statuses: String,
) -> Result<(), StepError> {
    let identity = group_world.identity();
    for entry in statuses.split(',') {
        let (id, status) = entry
            .split_once('=')
            .ok_or_else(|| StepError::Assertion(format!("malformed status entry {entry}")))?;
        group_world.fake.insert_server(server_record(
            id,
            &identity.server_name(),
            status,
            identity.tag_map(),
        ));
    }
    Ok(())
}

#[given("create attempt \"{attempt}\" fails")]
fn create_attempt_fails(group_world: &GroupWorld, attempt: usize) {
    group_world.fake.fail_create_attempt(attempt);
}

#[when("the group is initialised")]
fn initialise(group_world: &GroupWorld) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let mut group = group_world.group();
    let result =
        runtime.block_on(group.init(&CancellationToken::new(), ConnectorSettings::default()));

    group_world.observe(|observed| match result {
        Ok(info) => observed.info = Some(info),
        Err(GroupError::Config(errors)) => observed.violations = Some(errors.len()),
        Err(other) => observed.init_error = Some(other.to_string()),
    });
    Ok(())
}

#[when("the group is asked for \"{count}\" more servers")]
fn increase(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let group = initialised_group(group_world, &runtime)?;
    let outcome = runtime
        .block_on(group.increase(&CancellationToken::new(), count))
        .map_err(|err| StepError::Assertion(format!("increase failed: {err}")))?;

    group_world.observe(|observed| {
        observed.running = Some(outcome.succeeded);
        observed.failures = outcome.errors.iter().map(|failure| failure.stage).collect();
    });
    Ok(())
}

#[when("the group is asked to delete \"{ids}\"")]
fn decrease(group_world: &GroupWorld, ids: String) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let group = initialised_group(group_world, &runtime)?;
    let requested: Vec<String> = ids.split(',').map(str::to_owned).collect();
    let outcome = runtime
        .block_on(group.decrease(&CancellationToken::new(), &requested))
        .map_err(|err| StepError::Assertion(format!("decrease failed: {err}")))?;

    group_world.observe(|observed| {
        observed.failures = outcome.errors.iter().map(|failure| failure.stage).collect();
        observed.deleted = Some(outcome.succeeded);
    });
    Ok(())
}

#[when("the group reports its instances")]
fn update(group_world: &GroupWorld) -> Result<(), StepError> {
    let runtime = Runtime::new()?;
    let group = initialised_group(group_world, &runtime)?;
    let mut reports = Vec::new();
    runtime
        .block_on(group.update(
            &CancellationToken::new(),
            &mut |id: &str, state: State| reports.push((id.to_owned(), state)),
        ))
        .map_err(|err| StepError::Assertion(format!("update failed: {err}")))?;

    group_world.observe(|observed| observed.reports = reports);
    Ok(())
}

#[then("initialisation succeeds with an id containing \"{fragment}\"")]
fn init_succeeds(group_world: &GroupWorld, fragment: String) -> Result<(), StepError> {
    group_world.observe(|observed| match (&observed.info, &observed.init_error) {
        (Some(info), _) if info.id.contains(&fragment) => Ok(()),
        (Some(info), _) => Err(StepError::Assertion(format!(
            "id {} does not contain {fragment}",
            info.id
        ))),
        (None, Some(error)) => Err(StepError::Assertion(format!("init failed: {error}"))),
        (None, None) => Err(StepError::Assertion(String::from("missing init outcome"))),
    })
}

#[then("the reported version is not empty")]
fn version_not_empty(group_world: &GroupWorld) -> Result<(), StepError> {
    group_world.observe(|observed| {
        observed
            .info
            .as_ref()
            .filter(|info| !info.version.is_empty())
            .map(|_| ())
            .ok_or_else(|| StepError::Assertion(String::from("version should be reported")))
    })
}

#[then("initialisation fails with \"{count}\" violations")]
fn init_fails(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let observed = group_world.observe(|observed| observed.violations);
    if observed == Some(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} violations, got {observed:?}"
        )))
    }
}

#[then("\"{count}\" servers are deleted")]
fn servers_deleted(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let deleted = group_world.observe(|observed| observed.deleted.clone());
    match deleted {
        Some(ids) if ids.len() == count => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {count} deleted servers, got {other:?}"
        ))),
    }
}

#[then("\"{count}\" servers are running")]
fn servers_running(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let running = group_world.observe(|observed| observed.running);
    if running == Some(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} running servers, got {running:?}"
        )))
    }
}

#[then("\"{count}\" item failures are reported")]
fn item_failures(group_world: &GroupWorld, count: usize) -> Result<(), StepError> {
    let failures = group_world.observe(|observed| observed.failures.clone());
    if failures.len() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} failures, got {failures:?}"
        )))
    }
}

#[then("the provider never received a delete call")]
fn no_delete_call(group_world: &GroupWorld) -> Result<(), StepError> {
    let calls = group_world.fake.delete_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "delete should not be called, got {calls:?}"
        )))
    }
}

#[then("every create request carries the group identity")]
fn create_requests_carry_identity(group_world: &GroupWorld) -> Result<(), StepError> {
    let identity = group_world.identity();
    let requests = group_world.fake.create_requests();
    if requests.is_empty() {
        return Err(StepError::Assertion(String::from("no create requests")));
    }
    for request in &requests {
        if request.tags != identity.tag_map() || !identity.matches_name(&request.name) {
            return Err(StepError::Assertion(format!(
                "request {} is not stamped with the group identity",
                request.name
            )));
        }
    }
    Ok(())
}

#[then("the reported states are \"{expected}\"")]
fn reported_states(group_world: &GroupWorld, expected: String) -> Result<(), StepError> {
    let rendered = group_world.observe(|observed| render_reports(&observed.reports));
    if rendered == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected states {expected}, got {rendered}"
        )))
    }
}
