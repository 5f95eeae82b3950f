pub mod categories;
pub mod config;
pub mod demo;

use mirror_core::{DeviceSettings, TimingMode};

use crate::cli::DeviceArgs;

/// Configured device settings with the command-line overrides applied.
pub fn device_settings(base: &DeviceSettings, args: &DeviceArgs) -> DeviceSettings {
    let mut settings = base.clone();
    if args.post_commit {
        settings.timing = TimingMode::PostCommit;
    }
    if args.no_collections {
        settings.collections = false;
    }
    settings
}
