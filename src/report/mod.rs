// Trade and equity report export
use crate::models::{EquitySnapshot, TradeLogEntry};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Files written by one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub trades: PathBuf,
    pub equity: PathBuf,
}

pub trait ReportExporter: Send {
    /// Write the full trade and equity history, replacing the previous export
    fn export(
        &mut self,
        trades: &[TradeLogEntry],
        equity: &[EquitySnapshot],
    ) -> Result<ReportFiles>;
}

/// Base file name for a report started at `at`
pub fn report_base_name(at: DateTime<Utc>) -> String {
    at.format("trading_log_%y_%m_%d_%H_%M_%S").to_string()
}

/// Writes `<base>_Trades.csv` and `<base>_Equity.csv`
///
/// The base name is fixed by the first export so every flush of a run
/// rewrites the same pair of files.
#[derive(Debug, Clone)]
pub struct CsvReportExporter {
    dir: PathBuf,
    base_name: Option<String>,
}

impl CsvReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_name: None,
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn files(&mut self) -> ReportFiles {
        let base = self
            .base_name
            .get_or_insert_with(|| report_base_name(Utc::now()))
            .clone();

        ReportFiles {
            trades: self.dir.join(format!("{}_Trades.csv", base)),
            equity: self.dir.join(format!("{}_Equity.csv", base)),
        }
    }
}

impl ReportExporter for CsvReportExporter {
    fn export(
        &mut self,
        trades: &[TradeLogEntry],
        equity: &[EquitySnapshot],
    ) -> Result<ReportFiles> {
        fs::create_dir_all(&self.dir)?;
        let files = self.files();

        write_trades(&files.trades, trades)?;
        write_equity(&files.equity, equity)?;

        tracing::debug!(
            trades = trades.len(),
            snapshots = equity.len(),
            path = %files.trades.display(),
            "Reports written"
        );
        Ok(files)
    }
}

fn write_trades(path: &Path, trades: &[TradeLogEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["time", "symbol", "type", "price", "volume", "profit_loss"])?;

    for entry in trades {
        let profit_loss = entry
            .profit_loss
            .map(|pl| pl.to_string())
            .unwrap_or_default();
        writer.write_record([
            entry.timestamp.to_rfc3339(),
            entry.symbol.clone(),
            entry.action.as_str().to_string(),
            entry.price.to_string(),
            entry.volume.to_string(),
            profit_loss,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_equity(path: &Path, equity: &[EquitySnapshot]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["time", "balance", "equity"])?;

    for snapshot in equity {
        writer.write_record([
            snapshot.timestamp.to_rfc3339(),
            snapshot.balance.to_string(),
            snapshot.equity.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;
    use chrono::TimeZone;

    fn sample_trades() -> Vec<TradeLogEntry> {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        vec![
            TradeLogEntry {
                timestamp: t,
                symbol: "EURUSD".to_string(),
                action: TradeAction::Open,
                price: 1.1,
                volume: 0.01,
                profit_loss: None,
            },
            TradeLogEntry {
                timestamp: t,
                symbol: "EURUSD".to_string(),
                action: TradeAction::Close,
                price: 1.2,
                volume: 0.01,
                profit_loss: Some(0.08),
            },
        ]
    }

    #[test]
    fn test_base_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(report_base_name(at), "trading_log_24_03_07_09_05_01");
    }

    #[test]
    fn test_export_writes_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvReportExporter::new(dir.path()).with_base_name("run");
        let equity = vec![EquitySnapshot {
            timestamp: Utc::now(),
            balance: 100.0,
            equity: 101.5,
        }];

        let files = exporter.export(&sample_trades(), &equity).unwrap();
        assert_eq!(files.trades, dir.path().join("run_Trades.csv"));
        assert_eq!(files.equity, dir.path().join("run_Equity.csv"));

        let mut reader = csv::Reader::from_path(&files.trades).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "open");
        assert_eq!(&rows[0][5], "");
        assert_eq!(&rows[1][2], "close");
        assert_eq!(&rows[1][5], "0.08");

        let mut reader = csv::Reader::from_path(&files.equity).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["time", "balance", "equity"]);
        assert_eq!(reader.records().count(), 1);
    }

    #[test]
    fn test_repeated_export_reuses_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvReportExporter::new(dir.path().join("reports"));

        let first = exporter.export(&[], &[]).unwrap();
        let second = exporter.export(&sample_trades(), &[]).unwrap();

        assert_eq!(first, second);
        assert!(first
            .trades
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("trading_log_"));

        let mut reader = csv::Reader::from_path(&second.trades).unwrap();
        assert_eq!(reader.records().count(), 2);
        assert_eq!(fs::read_dir(exporter.dir()).unwrap().count(), 2);
    }
}
