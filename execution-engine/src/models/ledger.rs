use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use trading::{Fill, OrderId, OrderOrigin, Side};
use uuid::Uuid;

pub const CASH_ACCOUNT: &str = "CASH";
pub const FEES_ACCOUNT: &str = "FEES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub entries: Vec<LedgerEntry>,
}

impl Transaction {
    /// Double-entry view of a fill: cash against the position, with fees as their own leg.
    pub fn from_fill(fill: &Fill) -> Self {
        let notional = fill.notional();
        let position = fill.side.sign() * notional;
        Self {
            id: Uuid::new_v4(),
            timestamp: fill.timestamp,
            description: format!("{} {} {} @ {:.4}", fill.side, fill.quantity, fill.symbol, fill.price),
            entries: vec![
                LedgerEntry {
                    account: CASH_ACCOUNT.to_string(),
                    amount: fill.cash_delta(),
                },
                LedgerEntry {
                    account: format!("POSITION:{}", fill.symbol),
                    amount: position,
                },
                LedgerEntry {
                    account: FEES_ACCOUNT.to_string(),
                    amount: fill.fees,
                },
            ],
        }
    }

    /// Verifies that the sum of all entries is zero.
    pub fn is_balanced(&self) -> bool {
        let sum: f64 = self.entries.iter().map(|e| e.amount).sum();
        sum.abs() < 1e-6
    }
}

/// One fill as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Position in the ledger, starting at 1.
    pub index: u64,
    /// Admission sequence of the order that produced the fill.
    pub order_sequence: u64,
    pub origin: OrderOrigin,
    pub fill: Fill,
    pub transaction: Transaction,
}

impl LedgerRecord {
    pub fn order_id(&self) -> OrderId {
        self.fill.order_id
    }

    pub fn side(&self) -> Side {
        self.fill.side
    }
}

pub struct TransactionLogger {
    file_path: PathBuf,
}

impl TransactionLogger {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn log(&mut self, transaction: &Transaction) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        // Date, Description, Account, Amount, TxID
        for entry in &transaction.entries {
            writeln!(
                file,
                "{},{},{},{:.4},{}",
                transaction.timestamp.to_rfc3339(),
                transaction.description,
                entry.account,
                entry.amount,
                transaction.id
            )?;
        }

        Ok(())
    }
}

/// Append-only, ordered record of every fill processed by the pipeline.
pub struct ExecutionLedger {
    records: RwLock<Vec<LedgerRecord>>,
    logger: Option<Mutex<TransactionLogger>>,
}

impl Default for ExecutionLedger {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ExecutionLedger {
    pub fn new(csv: Option<PathBuf>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            logger: csv.map(|p| Mutex::new(TransactionLogger::new(p))),
        }
    }

    pub fn append(&self, fill: Fill, origin: OrderOrigin, order_sequence: u64) -> LedgerRecord {
        let transaction = Transaction::from_fill(&fill);
        if let Some(logger) = &self.logger {
            let mut logger = logger.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = logger.log(&transaction) {
                error!("Failed to write ledger transaction {}: {}", transaction.id, e);
            }
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = LedgerRecord {
            index: records.len() as u64 + 1,
            order_sequence,
            origin,
            fill,
            transaction,
        };
        records.push(record.clone());
        record
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.fill.clone())
            .collect()
    }

    pub fn for_order(&self, order_id: OrderId) -> Vec<LedgerRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.fill.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_balanced(&self) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|r| r.transaction.is_balanced())
    }
}
