use config::load_config;
use config::shared::MergerConfig;

use crate::error::MergerResult;

/// Loads and validates the merger configuration.
///
/// Uses the standard loading mechanism from [`config`] and validates the resulting
/// [`MergerConfig`] before returning it.
pub fn load_merger_config() -> MergerResult<MergerConfig> {
    let config = load_config::<MergerConfig>()?;
    config.validate()?;

    Ok(config)
}
