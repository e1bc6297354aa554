//! CSV intake of beneficiary registrations into the directory.

mod parser;

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::distribution::directory::BeneficiaryDirectory;
use crate::workflows::distribution::domain::BeneficiaryId;

use parser::BeneficiaryRow;

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read beneficiary file: {}", err),
            ImportError::Csv(err) => write!(f, "invalid beneficiary CSV data: {}", err),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Refused row, numbered from 1 after the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub accepted: Vec<BeneficiaryId>,
    pub rejected: Vec<RowError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Admits each well-formed row whole; malformed rows are reported, never partially stored.
pub struct BeneficiaryImporter;

impl BeneficiaryImporter {
    pub fn from_path<P, D>(
        path: P,
        directory: &D,
        as_of: DateTime<Utc>,
    ) -> Result<ImportReport, ImportError>
    where
        P: AsRef<Path>,
        D: BeneficiaryDirectory + ?Sized,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, directory, as_of)
    }

    pub fn from_reader<R, D>(
        reader: R,
        directory: &D,
        as_of: DateTime<Utc>,
    ) -> Result<ImportReport, ImportError>
    where
        R: Read,
        D: BeneficiaryDirectory + ?Sized,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut report = ImportReport::default();

        for (index, record) in csv_reader.deserialize::<BeneficiaryRow>().enumerate() {
            let row = index + 1;
            report.total_rows += 1;

            let parsed = match record {
                Ok(parsed) => parsed,
                Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => return Err(err.into()),
                Err(err) => {
                    report.reject(row, row_error_reason(&err));
                    continue;
                }
            };

            let outcome = parsed.into_beneficiary(as_of).and_then(|beneficiary| {
                let id = beneficiary.id.clone();
                directory
                    .admit(beneficiary)
                    .map(|()| id)
                    .map_err(|defect| defect.to_string())
            });

            match outcome {
                Ok(id) => report.accepted.push(id),
                Err(reason) => report.reject(row, reason),
            }
        }

        info!(
            total = report.total_rows,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "beneficiary import finished"
        );
        Ok(report)
    }
}

impl ImportReport {
    fn reject(&mut self, row: usize, reason: String) {
        warn!(row, reason = %reason, "beneficiary row rejected");
        self.rejected.push(RowError { row, reason });
    }
}

fn row_error_reason(err: &csv::Error) -> String {
    match err.kind() {
        csv::ErrorKind::Deserialize { err, .. } => match err.field() {
            Some(field) => format!("column {}: {}", field + 1, err.kind()),
            None => err.kind().to_string(),
        },
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
            format!("expected {expected_len} columns, found {len}")
        }
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::distribution::directory::InMemoryBeneficiaryDirectory;
    use chrono::TimeZone;
    use std::io::Cursor;

    const HEADER: &str = "id,national_id,full_name,phone,governorate,district,household_size,has_children,has_elderly,total_packages,last_received_on,added_on\n";

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()
    }

    fn import(body: &str, directory: &InMemoryBeneficiaryDirectory) -> ImportReport {
        let csv = format!("{HEADER}{body}");
        BeneficiaryImporter::from_reader(Cursor::new(csv), directory, as_of())
            .expect("import succeeds")
    }

    #[test]
    fn well_formed_rows_are_admitted() {
        let directory = InMemoryBeneficiaryDirectory::default();
        let report = import(
            "B-001,401234567,Amal Haddad,0591234567,rafah,Tal al-Sultan,5,yes,no,2,2025-03-10,2024-11-02\n\
B-002,401234568,Yusuf Nasser,0597654321,Gaza,Rimal,1,no,yes,0,,\n",
            &directory,
        );

        assert!(report.is_clean());
        assert_eq!(report.total_rows, 2);
        assert_eq!(directory.len(), 2);

        let yusuf = directory
            .find_by_id(&BeneficiaryId::new("B-002"))
            .expect("admitted");
        assert_eq!(yusuf.governorate.as_str(), "gaza");
        assert_eq!(yusuf.added_at, as_of());
        assert!(yusuf.last_received_at.is_none());
    }

    #[test]
    fn malformed_rows_are_rejected_individually() {
        let directory = InMemoryBeneficiaryDirectory::default();
        let report = import(
            "B-001,12345,Short Id,0591234567,rafah,,3,no,no,0,,\n\
B-002,401234568,Bad Flag,0591234567,rafah,,3,sometimes,no,0,,\n\
B-003,401234569,Unknown Area,0591234567,sinai,,3,no,no,0,,\n\
B-004,401234570,Valid Row,0591234567,middle,Deir al-Balah,4,yes,no,0,,\n\
B-004,401234571,Duplicate Row,0591234567,middle,,4,yes,no,0,,\n",
            &directory,
        );

        assert_eq!(report.total_rows, 5);
        assert_eq!(report.accepted, vec![BeneficiaryId::new("B-004")]);
        let rows: Vec<usize> = report.rejected.iter().map(|error| error.row).collect();
        assert_eq!(rows, vec![1, 2, 3, 5]);
        assert!(report.rejected[0].reason.contains("national id"));
        assert!(report.rejected[3].reason.contains("already registered"));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn inconsistent_history_is_rejected() {
        let directory = InMemoryBeneficiaryDirectory::default();
        let report = import(
            "B-001,401234567,No Date,0591234567,rafah,,3,no,no,4,,\n",
            &directory,
        );

        assert!(report.accepted.is_empty());
        assert!(report.rejected[0].reason.contains("inconsistent benefit history"));
    }

    #[test]
    fn from_path_propagates_io_errors() {
        let directory = InMemoryBeneficiaryDirectory::default();
        let error = BeneficiaryImporter::from_path("./does-not-exist.csv", &directory, as_of())
            .expect_err("expected io error");

        match error {
            ImportError::Io(_) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
