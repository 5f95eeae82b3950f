use crate::cli::OutputFormat;
use colored::Colorize;
use mirror_core::MirrorCall;
use serde_json::{Value, json};
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_heading(msg: &str) {
    println!("{}", msg.cyan().bold());
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// One row of a listener group size report.
pub struct GroupRow {
    pub category: String,
    pub timing: String,
    pub touched: bool,
    pub sizes: Vec<usize>,
}

pub fn print_calls(calls: &[MirrorCall], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "operation": c.op.as_str(),
                        "entity": c.entity_name(),
                        "id": c.entity_id().map(|id| id.as_str()),
                        "state": c.entity.state,
                    })
                })
                .collect();
            print_json(&Value::Array(value));
        }
        OutputFormat::Table => {
            if calls.is_empty() {
                println!("No calls mirrored.");
                return;
            }
            let mut builder = Builder::default();
            builder.push_record(["#", "Operation", "Entity", "Id"]);
            for (i, call) in calls.iter().enumerate() {
                builder.push_record([
                    (i + 1).to_string(),
                    call.op.to_string(),
                    call.entity_name().to_string(),
                    call.entity_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!("Total: {}", calls.len());
        }
    }
}

pub fn print_groups(stages: &[&str], rows: &[GroupRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value: Vec<Value> = rows
                .iter()
                .map(|r| {
                    let sizes: serde_json::Map<String, Value> = stages
                        .iter()
                        .zip(&r.sizes)
                        .map(|(stage, size)| (stage.to_string(), json!(size)))
                        .collect();
                    json!({
                        "category": r.category,
                        "timing": r.timing,
                        "touched": r.touched,
                        "sizes": sizes,
                    })
                })
                .collect();
            print_json(&Value::Array(value));
        }
        OutputFormat::Table => {
            let mut builder = Builder::default();
            let mut header = vec![
                "Category".to_string(),
                "Timing".to_string(),
                "Touched".to_string(),
            ];
            header.extend(stages.iter().map(|s| s.to_string()));
            builder.push_record(header);
            for row in rows {
                let mut record = vec![
                    row.category.clone(),
                    row.timing.clone(),
                    if row.touched { "yes" } else { "-" }.to_string(),
                ];
                record.extend(row.sizes.iter().map(|s| s.to_string()));
                builder.push_record(record);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
        }
    }
}
