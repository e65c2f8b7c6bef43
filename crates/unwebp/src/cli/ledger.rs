//! The `unwebp ledger` command: list completed conversions.

use clap::Args;
use std::path::{Path, PathBuf};
use unwebp_core::ledger::read_records;
use unwebp_core::ProcessedRecord;

/// Arguments for the `ledger` command.
#[derive(Args, Debug, Default)]
pub struct LedgerArgs {
    /// Watched directory whose ledger to read (overrides `watch.dir`)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,

    /// Print only the number of records
    #[arg(long, conflicts_with = "json")]
    pub count: bool,
}

/// Execute the ledger command.
pub async fn execute(args: LedgerArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(dir) = &args.dir {
        config.watch.dir = dir.clone();
    }

    let path = config.ledger_path();
    let policy = config.ledger.on_malformed;
    let records = tokio::task::spawn_blocking(move || read_records(&path, policy)).await??;

    print!("{}", render(&records, &args)?);
    Ok(())
}

fn render(records: &[ProcessedRecord], args: &LedgerArgs) -> anyhow::Result<String> {
    if args.count {
        return Ok(format!("{}\n", records.len()));
    }
    if args.json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(records)?));
    }
    Ok(records
        .iter()
        .map(|r| format!("{} -> {}\n", r.source, r.destination))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ProcessedRecord> {
        vec![
            ProcessedRecord {
                source: "a.webp".into(),
                destination: "converted/Xy12.png".into(),
            },
            ProcessedRecord {
                source: "b.webp".into(),
                destination: "converted/Ab34.png".into(),
            },
        ]
    }

    #[test]
    fn test_plain_output_lists_pairs() {
        let out = render(&records(), &LedgerArgs::default()).unwrap();
        assert_eq!(
            out,
            "a.webp -> converted/Xy12.png\nb.webp -> converted/Ab34.png\n"
        );
    }

    #[test]
    fn test_json_output_is_an_array() {
        let args = LedgerArgs {
            json: true,
            ..Default::default()
        };
        let out = render(&records(), &args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[1]["source"], "b.webp");
    }

    #[test]
    fn test_count_output() {
        let args = LedgerArgs {
            count: true,
            ..Default::default()
        };
        assert_eq!(render(&records(), &args).unwrap(), "2\n");
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("unwebp.toml");
        std::fs::write(&config_file, "").unwrap();

        let args = LedgerArgs {
            dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        execute(args, Some(&config_file)).await.unwrap();
    }
}
