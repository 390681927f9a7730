#![forbid(unsafe_code)]
//! Inspect and repair the block facts database

use blockfacts::config::load_config_from;
use blockfacts::timestamp::{day_for_timestamp, estimate_timestamp};
use blockfacts::BlockFacts;
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockfacts", about = "Per-farmer block accounting")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = blockfacts::config::DEFAULT_CONFIG_FILE)]
    config: String,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate the timestamp of a block height
    Estimate { height: u64 },
    /// Show the last synchronized height
    Height,
    /// List farmers by lifetime blocks
    Top {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the daily blocks of one farmer
    History { farmer: String },
    /// Credit a single block to a farmer
    Credit { farmer: String, height: u64 },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;

    // Estimation is pure; only the other commands touch the database.
    let open = || BlockFacts::open(&config);

    match cli.command {
        Command::Estimate { height } => {
            let timestamp = estimate_timestamp(height);
            let day = day_for_timestamp(timestamp, config.ledger.day_offset()?)?;
            if cli.json {
                println!("{}", json!({ "height": height, "timestamp": timestamp, "day": day }));
            } else {
                println!("{} {}", "Height:".bright_cyan(), height);
                println!("{} {}", "Estimated timestamp:".bright_cyan(), timestamp);
                println!("{} {}", "Day:".bright_cyan(), day);
            }
        }
        Command::Height => {
            let height = open()?.get_synced_height()?;
            if cli.json {
                println!("{}", json!({ "height": height }));
            } else {
                match height {
                    Some(h) => println!("{} {}", "Synced height:".bright_green(), h),
                    None => println!("{}", "Nothing synced yet".yellow()),
                }
            }
        }
        Command::Top { limit } => {
            let rows = open()?.ledger().top_farmers(limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("{}", "No blocks recorded".yellow());
            } else {
                let mut table = new_table(&["#", "Farmer", "Blocks"]);
                for (rank, row) in rows.iter().enumerate() {
                    table.add_row(vec![
                        Cell::new(rank + 1),
                        Cell::new(&row.farmer_address).fg(TableColor::Cyan),
                        Cell::new(row.block_count).fg(TableColor::Green),
                    ]);
                }
                println!("{table}");
            }
        }
        Command::History { farmer } => {
            let rows = open()?.ledger().farmer_history(&farmer)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("{}", format!("No blocks recorded for {farmer}").yellow());
            } else {
                let mut table = new_table(&["Day", "Blocks"]);
                for row in &rows {
                    table.add_row(vec![
                        Cell::new(&row.day),
                        Cell::new(row.block_count).fg(TableColor::Green),
                    ]);
                }
                println!("{table}");
                let total: u64 = rows.iter().map(|row| row.block_count).sum();
                println!("{} {}", "Total:".bright_green(), total);
            }
        }
        Command::Credit { farmer, height } => {
            let facts = open()?;
            facts.credit_block(&farmer, height)?;
            let total = facts.ledger().total_blocks(&farmer)?.unwrap_or(0);
            if cli.json {
                println!("{}", json!({ "farmer": farmer, "height": height, "total": total }));
            } else {
                println!(
                    "{} block {} credited to {} (lifetime total {})",
                    "✓".bright_green(),
                    height,
                    farmer.cyan(),
                    total
                );
            }
        }
    }

    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}
