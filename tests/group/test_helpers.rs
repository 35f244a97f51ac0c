//! Shared fixtures for instance-group BDD scenarios.

use std::sync::{Arc, Mutex, PoisonError};

use fleeting_plugin_cloudscale::group::TEST_TOKEN;
use fleeting_plugin_cloudscale::test_support::FakeCompute;
use fleeting_plugin_cloudscale::{
    GroupConfig, Identity, InstanceGroup, ProviderInfo, Stage, State, VersionInfo,
};
use rstest::fixture;

use crate::test_constants::{DEFAULT_FLAVOR, DEFAULT_IMAGE, DEFAULT_VOLUME_SIZE_GB};

/// Observations recorded by `when` steps for later assertions.
#[derive(Debug, Default)]
pub struct Observations {
    pub config: GroupConfig,
    pub info: Option<ProviderInfo>,
    pub violations: Option<usize>,
    pub init_error: Option<String>,
    pub running: Option<usize>,
    pub deleted: Option<Vec<String>>,
    pub failures: Vec<Stage>,
    pub reports: Vec<(String, State)>,
}

/// Scenario world: a shared fake provider plus recorded observations.
#[derive(Clone, Debug, Default)]
pub struct GroupWorld {
    pub fake: FakeCompute,
    observations: Arc<Mutex<Observations>>,
}

impl GroupWorld {
    pub fn observe<T>(&self, apply: impl FnOnce(&mut Observations) -> T) -> T {
        let mut observations = self
            .observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut observations)
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.observe(|observed| observed.config.group.clone()))
    }

    pub fn group(&self) -> InstanceGroup<FakeCompute> {
        let fake = self.fake.clone();
        let config = self.observe(|observed| observed.config.clone());
        InstanceGroup::with_connector(config, VersionInfo::from_build_env(), move |_: &str| {
            fake.clone()
        })
    }
}

pub fn valid_config(group: &str) -> GroupConfig {
    GroupConfig {
        group: group.to_owned(),
        api_token: TEST_TOKEN.to_owned(),
        flavor: DEFAULT_FLAVOR.to_owned(),
        image: DEFAULT_IMAGE.to_owned(),
        volume_size_gb: DEFAULT_VOLUME_SIZE_GB,
        ..GroupConfig::default()
    }
}

/// Renders `id=state` pairs joined by commas.
pub fn render_reports(reports: &[(String, State)]) -> String {
    reports
        .iter()
        .map(|(id, state)| format!("{id}={state}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[fixture]
pub fn group_world() -> GroupWorld {
    GroupWorld::default()
}
