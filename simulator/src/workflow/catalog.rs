use serde::{Deserialize, Serialize};
use srtcore::calibration::{CalibratorCatalog, FluxDensity};

/// Power-law flux model of one calibrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Flux in Jy at `reference_ghz`.
    pub flux_jy: f64,
    pub reference_ghz: f64,
    pub spectral_index: f64,
    /// Relative one-sigma error of the model.
    #[serde(default = "default_error_fraction")]
    pub error_fraction: f64,
}

fn default_error_fraction() -> f64 {
    0.02
}

impl CatalogEntry {
    pub fn flux_at(&self, frequency_ghz: f64) -> f64 {
        self.flux_jy * (frequency_ghz / self.reference_ghz).powf(self.spectral_index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CalibratorCatalog for StaticCatalog {
    fn lookup(
        &self,
        source: &str,
        frequency_ghz: f64,
        _bandwidth_ghz: f64,
        _time: f64,
    ) -> Option<FluxDensity> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(source))
            .map(|entry| {
                let flux = entry.flux_at(frequency_ghz);
                FluxDensity {
                    flux,
                    error: flux * entry.error_fraction,
                }
            })
    }
}

/// Approximate C-band models of the usual flux calibrators.
pub fn default_entries() -> Vec<CatalogEntry> {
    [("3C286", 5.8, -0.46), ("3C147", 4.9, -0.7), ("3C48", 3.5, -0.8)]
        .into_iter()
        .map(|(name, flux_jy, spectral_index)| CatalogEntry {
            name: name.to_string(),
            flux_jy,
            reference_ghz: 7.0,
            spectral_index,
            error_fraction: default_error_fraction(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_follows_power_law() {
        let catalog = StaticCatalog::new(default_entries());
        let at_reference = catalog.lookup("3C286", 7.0, 1.0, 0.0).unwrap();
        assert!((at_reference.flux - 5.8).abs() < 1e-12);
        assert!((at_reference.error - 0.116).abs() < 1e-12);
        let higher = catalog.lookup("3c286", 14.0, 1.0, 0.0).unwrap();
        assert!((higher.flux - 5.8 * 2f64.powf(-0.46)).abs() < 1e-12);
    }

    #[test]
    fn unknown_source_is_none() {
        let catalog = StaticCatalog::new(default_entries());
        assert!(catalog.lookup("W51", 7.0, 1.0, 0.0).is_none());
        assert_eq!(catalog.len(), 3);
    }
}
