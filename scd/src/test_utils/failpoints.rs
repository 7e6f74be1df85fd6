use fail::FailScenario;

/// Configured failpoints that are switched off again when dropped.
///
/// Holding the underlying [`FailScenario`] serializes tests that use failpoints, since the
/// registry is process global.
pub struct FailpointGuard<'a> {
    _scenario: FailScenario<'a>,
    names: Vec<String>,
}

impl<'a> FailpointGuard<'a> {
    /// Configures each `(name, action)` pair, e.g. `("archive.after_rename", "return")`.
    pub fn configure(failpoints: &[(&str, &str)]) -> FailpointGuard<'a> {
        let scenario = FailScenario::setup();

        let mut names = Vec::with_capacity(failpoints.len());
        for (name, action) in failpoints {
            fail::cfg(*name, action).expect("failpoint action is invalid");
            names.push((*name).to_owned());
        }

        Self {
            _scenario: scenario,
            names,
        }
    }
}

impl Drop for FailpointGuard<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            fail::remove(name);
        }
    }
}
