use std::sync::Arc;

use anyhow::{Context, Result};
use gateway_core::detector::LandmarkDetector;
use gateway_core::primitives::LandmarkSets;
use image::RgbImage;
use libloading::os::unix::Symbol;
use log::{info, warn};

use crate::configuration::OracleConfiguration;

/// Signature a detection plugin must export.
pub type DetectionFunc = fn(&RgbImage) -> Result<Option<LandmarkSets>>;

/// Primary detector loaded from a shared library at startup. The library
/// handle is kept for the lifetime of the oracle so the raw symbol stays
/// valid.
#[derive(Debug)]
pub struct PluginOracle {
    _lib: libloading::Library,
    detect: Symbol<DetectionFunc>,
}

impl PluginOracle {
    pub fn load(plugin_path: &str, function: &str) -> Result<Self> {
        let lib = unsafe { libloading::Library::new(plugin_path) }
            .with_context(|| format!("Failed to load the detection plugin {}", plugin_path))?;
        let detect = unsafe {
            let func: libloading::Symbol<DetectionFunc> =
                lib.get(function.as_bytes()).with_context(|| {
                    format!(
                        "The plugin {} does not export the function '{}'",
                        plugin_path, function
                    )
                })?;
            func.into_raw()
        };
        Ok(Self { _lib: lib, detect })
    }
}

impl LandmarkDetector for PluginOracle {
    fn name(&self) -> &'static str {
        "plugin"
    }

    fn detect(&self, image: &RgbImage) -> Result<Option<LandmarkSets>> {
        (self.detect)(image)
    }
}

/// Loads the configured oracle if there is one. A load failure is not
/// fatal: the service starts anyway and the dispatcher announces that the
/// fallback is permanently active.
pub fn install_from_config(
    conf: &Option<OracleConfiguration>,
) -> Option<Arc<dyn LandmarkDetector>> {
    let conf = conf.as_ref()?;
    match PluginOracle::load(&conf.plugin_path, &conf.function) {
        Ok(oracle) => {
            info!(
                target: "gateway::oracle",
                "loaded detection oracle from {} (function '{}')",
                conf.plugin_path,
                conf.function
            );
            Some(Arc::new(oracle))
        }
        Err(e) => {
            warn!(
                target: "gateway::oracle",
                "detection oracle unavailable, continuing without it: {:#}",
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_plugin_reports_path() {
        let e = PluginOracle::load("/nonexistent/liboracle.so", "landmark_detect").unwrap_err();
        assert!(e.to_string().contains("/nonexistent/liboracle.so"));
    }

    #[test]
    fn test_unconfigured_oracle_is_none() {
        assert!(install_from_config(&None).is_none());
    }

    #[test]
    fn test_broken_configuration_degrades_to_none() {
        let conf = Some(OracleConfiguration {
            plugin_path: "/nonexistent/liboracle.so".to_string(),
            function: "landmark_detect".to_string(),
        });
        assert!(install_from_config(&conf).is_none());
    }
}
