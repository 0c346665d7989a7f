//! Well-known artifact and file names

// Registry names
pub const FULL_PAYLOAD: &str = "full_payload";
pub const DELTA_PAYLOADS: &str = "delta_payloads";
pub const STATEFUL_PAYLOAD: &str = "stateful";
pub const BASE_IMAGE: &str = "base_image";
pub const RECOVERY_IMAGE: &str = "recovery_image";
pub const TEST_IMAGE: &str = "test_image";
pub const FACTORY_IMAGE: &str = "factory_image";
pub const AUTOTEST: &str = "autotest";
pub const TEST_SUITES: &str = "test_suites";
pub const AU_SUITE: &str = "au_suite";
pub const FIRMWARE: &str = "firmware";
pub const SYMBOLS: &str = "symbols";

/// Release channels with their own paygen AU suite
pub const CHANNELS: &[&str] = &["canary", "dev", "beta", "stable"];

// Files in the archive and on disk
pub const UPDATE_FILE: &str = "update.gz";
pub const STATEFUL_FILE: &str = "stateful.tgz";
pub const IMAGE_ZIP: &str = "image.zip";
pub const BASE_IMAGE_FILE: &str = "chromiumos_base_image.bin";
pub const RECOVERY_IMAGE_FILE: &str = "recovery_image.bin";
pub const TEST_IMAGE_FILE: &str = "chromiumos_test_image.bin";
pub const FACTORY_ZIP: &str = "ChromeOS-factory*zip";
pub const FACTORY_IMAGE_FILE: &str = "factory_test/chromeos_factory_image.bin";
pub const AUTOTEST_TAR: &str = "autotest.tar";
pub const AUTOTEST_DIR: &str = "autotest";
pub const TEST_SUITES_TAR: &str = "test_suites.tar.bz2";
pub const AU_SUITE_TAR: &str = "au_control.tar.bz2";
pub const FIRMWARE_TAR: &str = "firmware_from_source.tar.bz2";
pub const SYMBOLS_TGZ: &str = "debug.tgz";
pub const BREAKPAD_DIR: &str = "debug/breakpad";

// Delta payload layout
pub const AU_DIR: &str = "au";
pub const NTON_SUFFIX: &str = "_nton";
pub const MTON_SUFFIX: &str = "_mton";

/// Touched in the build directory on every stage request
pub const TIMESTAMP_FILE: &str = "staged.timestamp";

/// Registry name of a channel's paygen AU suite
pub fn paygen_au_suite(channel: &str) -> String {
    format!("paygen_au_{}", channel)
}

/// Archive holding a channel's paygen AU suite
pub fn paygen_au_suite_file(channel: &str) -> String {
    format!("paygen_au_{}_control.tar.bz2", channel)
}
