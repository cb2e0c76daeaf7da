use gale_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct DefaultScenarioValues {}

impl UserValuesConstraint for DefaultScenarioValues {}

/// Per VU values for HTTP scenarios.
///
/// Scenarios that need to keep their own state between iterations put it in `scenario_values`.
#[derive(Default, Debug)]
pub struct HttpVuContext<SV: UserValuesConstraint = DefaultScenarioValues> {
    pub scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpVuContext<SV> {}
