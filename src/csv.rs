use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::AccountSummary;
use crate::model::{AccountId, InvalidPin, Operation, Pin};
use crate::Amount;

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: &'static str,
        field: &'static str,
    },

    #[error("line {line}: {source}")]
    BadPin { line: usize, source: InvalidPin },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    name: Option<String>,
    from: Option<AccountId>,
    to: Option<AccountId>,
    amount: Option<f64>,
    pin: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    account: AccountId,
    owner: String,
    balance: String,
    total_spent: String,
    badges: usize,
}

fn require<T>(
    value: Option<T>,
    line: usize,
    op: &'static str,
    field: &'static str,
) -> Result<T, CsvError> {
    value.ok_or(CsvError::MissingField { line, op, field })
}

/// Read driver operations from a csv file
pub fn read_operations(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<Operation, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            match row.op.as_str() {
                "open" => {
                    let name = require(row.name, line, "open", "name")?;
                    let balance = require(row.amount, line, "open", "amount")?;
                    let pin: Pin = require(row.pin, line, "open", "pin")?
                        .parse()
                        .map_err(|source| CsvError::BadPin { line, source })?;
                    Ok(Operation::Open {
                        name,
                        balance: Amount::from_float(balance),
                        pin,
                    })
                }
                "pay" => Ok(Operation::Pay {
                    from: require(row.from, line, "pay", "from")?,
                    to: require(row.to, line, "pay", "to")?,
                    amount: Amount::from_float(require(row.amount, line, "pay", "amount")?),
                    pin: require(row.pin, line, "pay", "pin")?,
                }),
                "request" => Ok(Operation::Request {
                    from: require(row.from, line, "request", "from")?,
                    to: require(row.to, line, "request", "to")?,
                    amount: Amount::from_float(require(
                        row.amount, line, "request", "amount",
                    )?),
                    pin: require(row.pin, line, "request", "pin")?,
                }),
                "claim" => Ok(Operation::Claim {
                    account: require(row.from, line, "claim", "from")?,
                }),
                other => Err(CsvError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

/// write account summaries to stdout in csv format
pub fn write_accounts(accounts: impl IntoIterator<Item = AccountSummary>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for summary in accounts {
        let row = OutputRow {
            account: summary.account,
            owner: summary.owner,
            balance: summary.balance.to_string(),
            total_spent: summary.total_spent.to_string(),
            badges: summary.badges,
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
