use multifix::{MultifixConfig, CONFIG_ENV_VAR};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{Scenario, SimError, SCENARIO_ENV_VAR};

pub(crate) struct AppWiring {
    pub(crate) config: MultifixConfig,
    pub(crate) scenario: Scenario,
}

pub(crate) fn build_app() -> Result<AppWiring, SimError> {
    init_tracing();
    info!("=== multifix server sim startup ===");

    let config = MultifixConfig::from_env()?;
    let scenario = Scenario::from_env()?;
    info!(
        config_source = source_label(CONFIG_ENV_VAR),
        scenario_source = source_label(SCENARIO_ENV_VAR),
        setting = %config.watched_setting,
        map = %scenario.map,
        "app_configured"
    );

    Ok(AppWiring { config, scenario })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn source_label(var: &str) -> &'static str {
    if std::env::var_os(var).is_some() {
        "env"
    } else {
        "builtin"
    }
}
