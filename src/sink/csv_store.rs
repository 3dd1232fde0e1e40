// src/sink/csv_store.rs
//! CSV files for raw windows and the cumulative results table

use crate::acquisition::Window;
use crate::config::constants::{metrics, output};
use crate::processing::{
    AfibAssessment, BloodPressure, FatigueAssessment, Metric, ResultRecord, UnavailableReason,
};
use crate::sink::{ResultSink, SinkError};
use crate::utils::time::{file_safe_timestamp, format_timestamp};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct RawRow {
    #[serde(rename = "Timestamps")]
    timestamp: String,
    #[serde(rename = "ECG")]
    ecg: i32,
}

/// One line of the cumulative results table, as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub filename: String,
    #[serde(rename = "HR")]
    pub heart_rate: String,
    #[serde(rename = "Fatigue")]
    pub fatigue: String,
    pub preds: String,
    #[serde(rename = "SBP")]
    pub sbp: String,
    #[serde(rename = "DBP")]
    pub dbp: String,
    #[serde(rename = "AFIB Risk %")]
    pub afib_risk: String,
    #[serde(rename = "AFIB[0,1]")]
    pub afib_predictions: String,
}

fn two_decimals(value: f64) -> String {
    format!("{value:.2}")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ResultRow {
    pub fn from_record(record: &ResultRecord) -> Result<Self, SinkError> {
        let heart_rate = match &record.heart_rate {
            Metric::Value(hr) => two_decimals(*hr),
            Metric::Unavailable(_) => metrics::HEART_RATE_SENTINEL.to_string(),
        };

        let (fatigue, preds) = match &record.fatigue {
            Metric::Value(f) => {
                let scores: Vec<f64> = f.scores.iter().map(|&s| round2(s)).collect();
                (f.status.clone(), serde_json::to_string(&scores)?)
            }
            Metric::Unavailable(_) => (metrics::FATIGUE_SENTINEL.to_string(), "[]".to_string()),
        };

        let (sbp, dbp) = match &record.blood_pressure {
            Metric::Value(bp) => (bp.systolic, bp.diastolic),
            Metric::Unavailable(_) => (0.0, 0.0),
        };

        let (afib_risk, afib_predictions) = match &record.afib {
            Metric::Value(a) => (a.risk_percent, serde_json::to_string(&a.predictions)?),
            Metric::Unavailable(_) => (0.0, "[]".to_string()),
        };

        Ok(Self {
            filename: record.filename.clone(),
            heart_rate,
            fatigue,
            preds,
            sbp: two_decimals(sbp),
            dbp: two_decimals(dbp),
            afib_risk: two_decimals(afib_risk),
            afib_predictions,
        })
    }

    /// Rebuild a record; sentinels come back as `Unavailable(NotRecorded)`
    pub fn into_record(self) -> Result<ResultRecord, SinkError> {
        let not_recorded = || UnavailableReason::NotRecorded;

        let heart_rate = if self.heart_rate == metrics::HEART_RATE_SENTINEL {
            Metric::Unavailable(not_recorded())
        } else {
            Metric::Value(parse_float("HR", &self.heart_rate)?)
        };

        let fatigue = if self.fatigue == metrics::FATIGUE_SENTINEL {
            Metric::Unavailable(not_recorded())
        } else {
            Metric::Value(FatigueAssessment {
                status: self.fatigue,
                scores: serde_json::from_str(&self.preds)?,
            })
        };

        let systolic = parse_float("SBP", &self.sbp)?;
        let diastolic = parse_float("DBP", &self.dbp)?;
        let blood_pressure = if systolic == 0.0 && diastolic == 0.0 {
            Metric::Unavailable(not_recorded())
        } else {
            Metric::Value(BloodPressure {
                systolic,
                diastolic,
            })
        };

        let risk_percent = parse_float("AFIB Risk %", &self.afib_risk)?;
        let predictions: Vec<u8> = serde_json::from_str(&self.afib_predictions)?;
        let afib = if risk_percent == 0.0 && predictions.is_empty() {
            Metric::Unavailable(not_recorded())
        } else {
            Metric::Value(AfibAssessment {
                risk_percent,
                predictions,
            })
        };

        Ok(ResultRecord {
            filename: self.filename,
            heart_rate,
            fatigue,
            blood_pressure,
            afib,
        })
    }
}

fn parse_float(column: &'static str, value: &str) -> Result<f64, SinkError> {
    value.parse().map_err(|_| SinkError::Format {
        column,
        value: value.to_string(),
    })
}

/// Read a cumulative results table back into records
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<ResultRecord>, SinkError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    reader
        .deserialize::<ResultRow>()
        .map(|row| row?.into_record())
        .collect()
}

/// File-backed result store
///
/// Raw windows go to one file each; results are appended to a single table
/// named after the experiment start, with the header written once and a
/// flush after every record.
pub struct CsvResultStore {
    directory: PathBuf,
    subject_id: String,
    results_path: PathBuf,
    results: Option<Writer<File>>,
}

impl CsvResultStore {
    pub fn new(
        directory: impl Into<PathBuf>,
        subject_id: impl Into<String>,
        experiment_start: NaiveDateTime,
    ) -> Result<Self, SinkError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let results_path = directory.join(format!(
            "{}{}.csv",
            output::RESULTS_FILE_PREFIX,
            file_safe_timestamp(&experiment_start)
        ));

        Ok(Self {
            directory,
            subject_id: subject_id.into(),
            results_path,
            results: None,
        })
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// File name a closed window is stored under
    pub fn window_file_name(&self, window: &Window) -> String {
        format!(
            "{}{}{}.csv",
            self.subject_id,
            output::RAW_FILE_INFIX,
            file_safe_timestamp(&window.closed_at())
        )
    }

    fn write_raw(&self, path: &Path, window: &Window) -> Result<(), SinkError> {
        let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
        for sample in window.samples() {
            writer.serialize(RawRow {
                timestamp: format_timestamp(&sample.timestamp),
                ecg: sample.value,
            })?;
        }
        // Header for an empty window
        if window.is_empty() {
            writer.write_record(["Timestamps", "ECG"])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn results_writer(&mut self) -> Result<&mut Writer<File>, SinkError> {
        let writer = match self.results.take() {
            Some(writer) => writer,
            None => {
                let writer = WriterBuilder::new()
                    .has_headers(true)
                    .from_path(&self.results_path)?;
                info!(path = %self.results_path.display(), "results table created");
                writer
            }
        };
        Ok(self.results.insert(writer))
    }
}

impl ResultSink for CsvResultStore {
    fn persist_window(&mut self, window: &Window) -> Result<PathBuf, SinkError> {
        let path = self.directory.join(self.window_file_name(window));
        self.write_raw(&path, window)?;
        debug!(path = %path.display(), samples = window.len(), "raw window stored");
        Ok(path)
    }

    fn persist_partial(&mut self, window: &Window) -> Result<PathBuf, SinkError> {
        let name = format!(
            "{}{}{}{}.csv",
            self.subject_id,
            output::RAW_FILE_INFIX,
            file_safe_timestamp(&window.closed_at()),
            output::PARTIAL_FILE_SUFFIX
        );
        let path = self.directory.join(name);
        self.write_raw(&path, window)?;
        info!(path = %path.display(), samples = window.len(), "partial window stored");
        Ok(path)
    }

    fn persist_result(&mut self, record: &ResultRecord) -> Result<(), SinkError> {
        let row = ResultRow::from_record(record)?;
        let writer = self.results_writer()?;
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::WindowAccumulator;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn window() -> Window {
        let mut acc = WindowAccumulator::open(at(8, 50, 0), Duration::from_secs(300), 4);
        acc.offer(b"512\r\n", at(8, 50, 0)).unwrap();
        acc.offer(b"530\r\n", at(8, 50, 0)).unwrap();
        acc.offer(b"-3\r\n", at(8, 50, 1)).unwrap();
        acc.close(at(8, 55, 0))
    }

    fn full_record() -> ResultRecord {
        ResultRecord {
            filename: "luis_ecg_data_04-04-2021_08_55_00.csv".to_string(),
            heart_rate: Metric::Value(61.234),
            fatigue: Metric::Value(FatigueAssessment {
                status: "NORMAL".to_string(),
                scores: vec![0.1, 0.7, 0.2],
            }),
            blood_pressure: Metric::Value(BloodPressure {
                systolic: 116.5,
                diastolic: 72.25,
            }),
            afib: Metric::Value(AfibAssessment {
                risk_percent: 12.5,
                predictions: vec![0, 1, 0, 0, 0, 0, 0, 0],
            }),
        }
    }

    fn empty_record() -> ResultRecord {
        let reason = || UnavailableReason::InsufficientPeaks { found: 0, required: 2 };
        ResultRecord {
            filename: "luis_ecg_data_04-04-2021_09_00_00.csv".to_string(),
            heart_rate: Metric::Unavailable(reason()),
            fatigue: Metric::Unavailable(reason()),
            blood_pressure: Metric::Unavailable(reason()),
            afib: Metric::Unavailable(reason()),
        }
    }

    #[test]
    fn test_raw_window_file() {
        let dir = tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path(), "luis", at(8, 49, 12)).unwrap();

        let path = store.persist_window(&window()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "luis_ecg_data_04-04-2021_08_55_00.csv"
        );

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Timestamps,ECG");
        assert_eq!(lines[1], "04-04-2021_08:50:00,512");
        assert_eq!(lines[3], "04-04-2021_08:50:01,-3");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_partial_window_file() {
        let dir = tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path(), "luis", at(8, 49, 12)).unwrap();

        let path = store.persist_partial(&window()).unwrap();
        assert!(path
            .to_str()
            .unwrap()
            .ends_with("luis_ecg_data_04-04-2021_08_55_00_partial.csv"));
    }

    #[test]
    fn test_empty_window_has_header() {
        let dir = tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path(), "s", at(8, 49, 12)).unwrap();
        let empty =
            WindowAccumulator::open(at(8, 50, 0), Duration::from_secs(60), 0).close(at(8, 51, 0));

        let path = store.persist_window(&empty).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap().trim(), "Timestamps,ECG");
    }

    #[test]
    fn test_results_header_written_once() {
        let dir = tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path(), "luis", at(8, 49, 12)).unwrap();
        assert!(store
            .results_path()
            .ends_with("DATAFRAME_RESULTS_04-04-2021_08_49_12.csv"));

        store.persist_result(&full_record()).unwrap();
        store.persist_result(&empty_record()).unwrap();

        let content = fs::read_to_string(store.results_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "filename,HR,Fatigue,preds,SBP,DBP,AFIB Risk %,\"AFIB[0,1]\""
        );
        assert!(lines[2].contains(",NONE,NONE,[],0.00,0.00,0.00,[]"));
    }

    #[test]
    fn test_results_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path(), "luis", at(8, 49, 12)).unwrap();
        let records = vec![full_record(), empty_record()];
        for record in &records {
            store.persist_result(record).unwrap();
        }

        let read = read_results(store.results_path()).unwrap();
        assert_eq!(read.len(), 2);

        for (original, stored) in records.iter().zip(&read) {
            assert_eq!(
                ResultRow::from_record(original).unwrap(),
                ResultRow::from_record(stored).unwrap()
            );
        }

        assert_eq!(read[0].heart_rate, Metric::Value(61.23));
        assert_eq!(read[1].heart_rate, Metric::Unavailable(UnavailableReason::NotRecorded));
        assert_eq!(
            read[0].afib.value().map(|a| a.predictions.clone()),
            Some(vec![0, 1, 0, 0, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_malformed_stored_value() {
        let row = ResultRow {
            filename: "x.csv".to_string(),
            heart_rate: "sixty".to_string(),
            fatigue: "NONE".to_string(),
            preds: "[]".to_string(),
            sbp: "0.00".to_string(),
            dbp: "0.00".to_string(),
            afib_risk: "0.00".to_string(),
            afib_predictions: "[]".to_string(),
        };
        assert!(matches!(
            row.into_record(),
            Err(SinkError::Format { column: "HR", .. })
        ));
    }
}
