/*
 * Test utilities and fixtures for cpldmon
 *
 * Simulated platforms and fake sysfs trees shared by the unit tests of the
 * binary crate.
 */

#[cfg(test)]
pub mod test_utils {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use cm_core::ManualClock;
    use tempfile::TempDir;

    use crate::app::App;
    use crate::config::Config;

    /// Default configuration with sysfs rooted in a fresh temporary directory
    pub fn create_test_config() -> (Config, TempDir) {
        let sysfs = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.sysfs_root = sysfs.path().to_path_buf();
        (cfg, sysfs)
    }

    /// Simulated AS4630-54PE on a virtual clock. Keep the TempDir alive for
    /// as long as the app is used.
    pub fn simulated_app() -> (App, TempDir) {
        let (cfg, sysfs) = create_test_config();
        let app = App::simulated(cfg, Arc::new(ManualClock::new())).unwrap();
        (app, sysfs)
    }

    /// Publish `temp1_input` for a sensor under a fake sysfs root
    pub fn create_mock_temp_input(root: &Path, bus: u32, address: u16, hwmon: usize, millicelsius: i32) {
        let dir = root
            .join("bus/i2c/devices")
            .join(format!("{}-{:04x}", bus, address))
            .join("hwmon")
            .join(format!("hwmon{}", hwmon));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("temp1_input"), format!("{}\n", millicelsius)).unwrap();
    }

    /// Asserts that a slice contains a specific item
    pub fn assert_contains<T: PartialEq + std::fmt::Debug>(slice: &[T], item: &T) {
        assert!(
            slice.contains(item),
            "Slice {:?} does not contain item {:?}",
            slice, item
        );
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use cm_core::thermal::{PublishedTemperature, SysfsTemperatureReader};

    #[test]
    fn test_simulated_app_has_cpld() {
        let (app, _sysfs) = simulated_app();
        assert_contains(&app.platform.registry().addresses(), &0x60);
    }

    #[test]
    fn test_mock_temp_input() {
        let (_cfg, sysfs) = create_test_config();
        create_mock_temp_input(sysfs.path(), 14, 0x48, 2, 42_000);
        let reader = SysfsTemperatureReader::new(sysfs.path());
        assert_eq!(reader.read_published(14, 0x48).unwrap(), 42_000);
    }
}
