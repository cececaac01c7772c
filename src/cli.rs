use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use adoption_lens::aggregate::compute;
use adoption_lens::data::filter::FilterSelection;
use adoption_lens::data::loader::load_file;
use adoption_lens::data::model::{CategoricalColumn, Dataset};
use adoption_lens::report::render_text;

#[derive(Parser)]
#[command(name = "adoption-lens")]
#[command(author, version, about = "Feature adoption reporting", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset to load (.csv, .json or .parquet)
    #[arg(
        short,
        long,
        global = true,
        env = "ADOPTION_DATA",
        default_value = "feature_adoption_dataset.csv"
    )]
    data: PathBuf,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute KPIs and chart tables for a filter selection
    Report {
        /// Device type to include (repeatable; omit for all)
        #[arg(long = "device")]
        devices: Vec<String>,

        /// Channel to include (repeatable; omit for all)
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// List the filter options found in the dataset
    Options,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Serialize)]
struct FilterOptions<'a> {
    device_type: Vec<&'a str>,
    channel: Vec<&'a str>,
}

impl<'a> FilterOptions<'a> {
    fn from_dataset(dataset: &'a Dataset) -> Self {
        Self {
            device_type: column_values(dataset, CategoricalColumn::DeviceType),
            channel: column_values(dataset, CategoricalColumn::Channel),
        }
    }
}

fn column_values(dataset: &Dataset, column: CategoricalColumn) -> Vec<&str> {
    dataset
        .distinct_values(column)
        .iter()
        .map(String::as_str)
        .collect()
}

impl Cli {
    pub fn execute(&self) -> Result<()> {
        let dataset = load_file(&self.data)
            .with_context(|| format!("failed to load dataset from {}", self.data.display()))?;

        let rendered = match &self.command {
            Commands::Report {
                devices,
                channels,
                format,
            } => {
                let selection = FilterSelection::from_lists(devices, channels);
                info!(
                    "Computing report for devices={:?} channels={:?}",
                    selection.devices, selection.channels
                );
                let view = compute(&dataset, &selection);

                match format {
                    Format::Json => self.to_json(&view)?,
                    Format::Text => render_text(&view),
                }
            }
            Commands::Options => self.to_json(&FilterOptions::from_dataset(&dataset))?,
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, rendered)
                .with_context(|| format!("failed to write {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{rendered}");
        }

        Ok(())
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flags_are_repeatable() {
        let cli = Cli::try_parse_from([
            "adoption-lens",
            "report",
            "--device",
            "mobile",
            "--device",
            "tablet",
            "--channel",
            "email",
            "--format",
            "text",
        ])
        .unwrap();

        match cli.command {
            Commands::Report {
                devices,
                channels,
                format,
            } => {
                assert_eq!(devices, vec!["mobile", "tablet"]);
                assert_eq!(channels, vec!["email"]);
                assert_eq!(format, Format::Text);
            }
            Commands::Options => panic!("expected report"),
        }
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "adoption-lens",
            "options",
            "--data",
            "events.parquet",
            "--pretty",
        ])
        .unwrap();
        assert_eq!(cli.data, PathBuf::from("events.parquet"));
        assert!(cli.pretty);
        assert!(cli.output.is_none());
    }

    #[test]
    fn options_keep_first_seen_order() {
        let dataset = adoption_lens::data::loader::load_csv_reader(
            "device_type,channel,signup_date,feature_adopted,feature_used_times\n\
             tablet,ads,2024-01-01,0,0\n\
             mobile,email,2024-01-02,1,2\n\
             tablet,email,2024-01-03,1,1\n"
                .as_bytes(),
        )
        .unwrap();
        let json = serde_json::to_string(&FilterOptions::from_dataset(&dataset)).unwrap();
        assert_eq!(json, r#"{"device_type":["tablet","mobile"],"channel":["ads","email"]}"#);
    }
}
