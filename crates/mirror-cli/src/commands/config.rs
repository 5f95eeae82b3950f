use anyhow::Result;
use colored::Colorize;
use mirror_core::MirrorConfig;

use crate::cli::OutputFormat;
use crate::output::print_json;

pub fn show(cfg: &MirrorConfig, source: Option<&str>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(cfg)?),
        OutputFormat::Table => {
            let device = &cfg.device;
            println!(
                "{}: {}",
                "Source".cyan(),
                source.unwrap_or("(defaults and environment)")
            );
            println!("{}: {}", "Timing".cyan(), device.timing);
            println!("{}: {}", "Collections".cyan(), device.collections);
            println!("{}: {}", "Marshal ids".cyan(), device.marshal_ids);
            println!("{}: {}", "Pending cascades".cyan(), device.pending_cascades);
            println!("{}: {}", "Process collection".cyan(), device.process_collection);
            println!("{}: {}", "Log level".cyan(), cfg.logging.level);
        }
    }
    Ok(())
}
