//! Command-line interface.

pub mod render;

use crate::app::{EditReport, MapTool, Preset};
use crate::config::ToolConfig;
use clap::{Parser, Subcommand};
use render::DisplayMode;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ecumap",
    version,
    about = "Read, scan, compare and edit calibration tables in Motronic M2.1 firmware images"
)]
pub struct Cli {
    /// Configuration file (JSON); falls back to $ECUMAP_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Save this run's edit journal here (.json for JSON, anything else for text)
    #[arg(long, global = true)]
    journal_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the tables (and parameters) of the active catalog
    List {
        /// Include configuration parameters
        #[arg(short, long, default_value_t = false)]
        params: bool,
    },
    /// Display one or more tables
    Show {
        image: PathBuf,
        /// Table name substring, or "all"
        #[arg(short, long, default_value = "all")]
        table: String,
        #[arg(short, long, value_enum, default_value_t = DisplayMode::Heatmap)]
        display: DisplayMode,
        /// Also print raw stored values
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },
    /// Search the image for table-like regions
    Scan {
        image: PathBuf,
        /// Hide candidates that overlap known tables
        #[arg(long, default_value_t = false)]
        unknown_only: bool,
        /// Window step in bytes (overrides the config)
        #[arg(long)]
        step: Option<usize>,
    },
    /// Compare tables between two images (B - A)
    Compare {
        image_a: PathBuf,
        image_b: PathBuf,
        #[arg(short, long, default_value = "all")]
        table: String,
    },
    /// Write one cell of a table
    SetCell {
        image: PathBuf,
        table: String,
        row: usize,
        col: usize,
        value: f64,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Multiply every cell of a table
    Scale {
        image: PathBuf,
        table: String,
        multiplier: f64,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Read or write configuration parameters
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },
    /// Apply a canned modification: fuel-enrich, revlimit
    Preset {
        image: PathBuf,
        name: String,
        /// Target RPM for revlimit
        #[arg(long)]
        rpm: Option<f64>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Export tables to CSV/TSV files
    Export {
        image: PathBuf,
        #[arg(short, long, default_value = "all")]
        table: String,
        /// Output directory
        #[arg(short, long, default_value = "export")]
        out: PathBuf,
    },
    /// Write a table from an exported CSV/TSV file
    Import {
        image: PathBuf,
        file: PathBuf,
        /// Target table; defaults to the name recorded in the file
        #[arg(short, long)]
        table: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// List backups of an image
    Backups { image: PathBuf },
    /// Restore an image from one of its backups
    Restore {
        image: PathBuf,
        backup: PathBuf,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ParamAction {
    /// Print parameter values; all of them when no name is given
    Get { image: PathBuf, name: Option<String> },
    /// Write a parameter after checking its allowed range
    Set {
        image: PathBuf,
        name: String,
        value: f64,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

pub fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ToolConfig::resolve(cli.config.as_deref())?;
    let tool = MapTool::new(config)?;
    let json = cli.json;

    match cli.command {
        Command::List { params } => {
            if json {
                println!("{}", tool.catalog().to_json());
            } else {
                print!("{}", render::render_catalog(tool.catalog(), params));
            }
        }

        Command::Show {
            image,
            table,
            display,
            verbose,
        } => {
            let tables = tool.read_tables(&image, &table)?;
            if json {
                let out: Vec<_> = tables
                    .iter()
                    .map(|(d, r)| match r {
                        Ok(t) => json!({ "name": d.name, "table": t }),
                        Err(e) => json!({ "name": d.name, "error": e.to_string() }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (i, (d, result)) in tables.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    match result {
                        Ok(t) => print!("{}", render::render_table(t, display, verbose)),
                        Err(e) => eprintln!("Error reading {}: {}", d.name, e),
                    }
                }
            }
        }

        Command::Scan {
            image,
            unknown_only,
            step,
        } => {
            let mut options = tool.config().scan.clone();
            if let Some(step) = step {
                options.step = step.max(1);
            }
            let mut found = tool.scan(&image, &options)?;
            if unknown_only {
                found = calmap_scan::filter_known(found, tool.catalog());
            }
            let annotated = calmap_scan::annotate_known(found, tool.catalog());
            if json {
                println!("{}", serde_json::to_string_pretty(&annotated)?);
            } else {
                print!("{}", render::render_candidates(&annotated));
            }
        }

        Command::Compare {
            image_a,
            image_b,
            table,
        } => {
            let results = tool.compare(&image_a, &image_b, &table)?;
            if json {
                let out: Vec<_> = results
                    .iter()
                    .map(|(d, r)| match r {
                        Ok(delta) => json!({
                            "name": d.name,
                            "delta": delta,
                            "summary": delta.summarize(),
                        }),
                        Err(e) => json!({ "name": d.name, "error": e.to_string() }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (d, result) in &results {
                    println!("\n== Comparing: {} ==", d.name);
                    match result {
                        Ok(delta) => {
                            print!("{}", render::render_summary(delta, &delta.summarize()));
                            println!();
                            print!("{}", render::render_delta(delta));
                        }
                        Err(e) => eprintln!("Failed to compare {}: {}", d.name, e),
                    }
                }
            }
        }

        Command::SetCell {
            image,
            table,
            row,
            col,
            value,
            dry_run,
        } => {
            let table = tool.find_table(&table)?;
            print_report(&tool.write_cell(&image, table, row, col, value, dry_run)?, json)?;
        }

        Command::Scale {
            image,
            table,
            multiplier,
            dry_run,
        } => {
            let table = tool.find_table(&table)?;
            print_report(&tool.scale_table(&image, table, multiplier, dry_run)?, json)?;
        }

        Command::Param { action } => match action {
            ParamAction::Get { image, name } => {
                let params = match name {
                    Some(name) => vec![tool.find_param(&name)?],
                    None => tool.catalog().params().iter().collect(),
                };
                let mut out = Vec::new();
                for p in params {
                    let value = tool.read_config_param(&image, p)?;
                    if json {
                        out.push(json!({ "name": p.name, "value": value, "unit": p.unit }));
                    } else {
                        println!("{:<24} {:>10.2} {:<6} [{} - {}]", p.name, value, p.unit, p.min, p.max);
                    }
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
            ParamAction::Set {
                image,
                name,
                value,
                dry_run,
            } => {
                let param = tool.find_param(&name)?;
                print_report(&tool.write_config_param(&image, param, value, dry_run)?, json)?;
            }
        },

        Command::Preset {
            image,
            name,
            rpm,
            dry_run,
        } => {
            let preset = Preset::parse(&name, rpm)?;
            print_report(&tool.apply_preset(&image, preset, dry_run)?, json)?;
        }

        Command::Export { image, table, out } => {
            let results = tool.export(&image, &table, &out)?;
            if json {
                let out: Vec<_> = results
                    .iter()
                    .map(|(name, r)| match r {
                        Ok(p) => json!({ "name": name, "file": p }),
                        Err(e) => json!({ "name": name, "error": e.to_string() }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (name, result) in &results {
                    match result {
                        Ok(p) => println!("{:<24} -> {}", name, p.display()),
                        Err(e) => eprintln!("{:<24} failed: {}", name, e),
                    }
                }
            }
        }

        Command::Import {
            image,
            file,
            table,
            dry_run,
        } => {
            let report = tool.import_table(&image, &file, table.as_deref(), dry_run)?;
            print_report(&report, json)?;
        }

        Command::Backups { image } => {
            let backups = tool.list_backups(&image)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("No backups of {}", image.display());
            } else {
                for b in &backups {
                    println!("{}", b.display());
                }
            }
        }

        Command::Restore {
            image,
            backup,
            dry_run,
        } => {
            print_report(&tool.restore_backup(&image, &backup, dry_run)?, json)?;
        }
    }

    if let Some(path) = &cli.journal_out {
        tool.save_journal(path)?;
    }
    Ok(())
}

fn print_report(report: &EditReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report_json(report))?);
        return Ok(());
    }
    let edit = &report.edit;
    match &report.outcome {
        None => {
            println!("[dry-run] {}: {}", edit.operation(), edit);
            print!("{}", render::render_patches(&report.patches));
            println!("Nothing written.");
        }
        Some(outcome) => {
            println!("{}: {}", edit.operation(), edit);
            println!("  {} byte(s) written", outcome.bytes_written);
            println!("  Backup: {}", outcome.backup);
        }
    }
    Ok(())
}

fn report_json(report: &EditReport) -> serde_json::Value {
    let edit = &report.edit;
    let patches: Vec<_> = report
        .patches
        .iter()
        .map(|p| json!({ "offset": p.offset, "bytes": p.bytes }))
        .collect();
    json!({
        "operation": edit.operation(),
        "description": edit.to_string(),
        "dry_run": report.outcome.is_none(),
        "patches": patches,
        "bytes_written": report.outcome.as_ref().map(|o| o.bytes_written),
        "backup": report.outcome.as_ref().map(|o| o.backup.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["ecumap", "--json", "scale", "ecu.bin", "Main Fuel Map", "1.05", "--dry-run"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::Scale { multiplier, dry_run: true, .. } if (multiplier - 1.05).abs() < 1e-12
        ));

        let cli = Cli::parse_from(["ecumap", "param", "set", "ecu.bin", "Rev Limiter", "7000"]);
        assert!(matches!(
            cli.command,
            Command::Param { action: ParamAction::Set { dry_run: false, .. } }
        ));

        let cli = Cli::parse_from(["ecumap", "restore", "ecu.bin", "ecu.bin.backup", "--journal-out", "edits.txt"]);
        assert_eq!(cli.journal_out, Some(PathBuf::from("edits.txt")));
        assert!(matches!(cli.command, Command::Restore { dry_run: false, .. }));

        let cli = Cli::parse_from(["ecumap", "show", "ecu.bin", "-d", "values", "-t", "fuel"]);
        assert!(matches!(
            cli.command,
            Command::Show { display: DisplayMode::Values, .. }
        ));
    }

    #[test]
    fn test_dry_run_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu.bin");
        std::fs::write(&path, vec![0u8; 0x8000]).unwrap();
        let tool = MapTool::new(ToolConfig::default()).unwrap();
        let report = tool.apply_preset(&path, Preset::RevLimit(7000.0), true).unwrap();
        let v = report_json(&report);
        assert_eq!(v["operation"], "Write Parameter");
        assert_eq!(v["dry_run"], true);
        assert_eq!(v["patches"][0]["offset"], 0x7000);
        assert_eq!(v["patches"][0]["bytes"][0], 81);
        assert!(v["backup"].is_null());
    }
}
