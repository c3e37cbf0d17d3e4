//! The SQLite-backed `Store`.
//!
//! Budgets and transactions are each one row. Category sets and split lists are stored as JSON
//! text, money as plain decimal text and dates as ISO-8601 text so that range filters can compare
//! them lexically.

mod migrations;

use crate::error::Res;
use crate::model::{Amount, Budget, BudgetId, Granularity, Split, Transaction};
use crate::store::{BudgetFilter, Store, TransactionFilter, WriteOp, MAX_BATCH_SIZE};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const BUDGET_COLUMNS: &str = "id, owner_id, category_ids, amount, granularity, start_date, \
    end_date, is_active, is_catch_all, created_at";
const TRANSACTION_COLUMNS: &str = "id, owner_id, date, amount, splits";

type BudgetRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    bool,
    bool,
    String,
);
type TransactionRow = (String, String, String, String, String);

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that there is a SQLite file at `path`
    /// - Opens a connection pool
    /// - Updates the database schema with migrations if it is out-of-date
    pub(crate) async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The SQLite file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        migrations::upgrade(&pool).await?;
        Ok(Self { pool })
    }

    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the database schema
    pub(crate) async fn init(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A file already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;
        migrations::upgrade(&pool).await?;
        debug!("Initialized SQLite database at {}", path.display());
        Ok(Self { pool })
    }

    pub(crate) async fn schema_version(&self) -> Res<i32> {
        migrations::current_version(&self.pool).await
    }

    pub(crate) async fn count_budgets(&self) -> Res<u64> {
        self.count("budgets").await
    }

    pub(crate) async fn count_transactions(&self) -> Res<u64> {
        self.count("transactions").await
    }

    async fn count(&self, table: &str) -> Res<u64> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count rows in {table}"))?;
        Ok(u64::try_from(row.0).unwrap_or_default())
    }
}

async fn connect(path: &Path, create: bool) -> Res<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("Failed to parse SQLite connection string")?
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open SQLite database at {}", path.display()))
}

#[async_trait::async_trait]
impl Store for Db {
    async fn get_budget(&self, id: &BudgetId) -> Res<Option<Budget>> {
        let row: Option<BudgetRow> =
            sqlx::query_as(&format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to read budget {id}"))?;
        row.map(budget_from_row).transpose()
    }

    async fn get_transaction(&self, id: &str) -> Res<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read transaction {id}"))?;
        row.map(transaction_from_row).transpose()
    }

    async fn query_budgets(&self, filter: &BudgetFilter) -> Res<Vec<Budget>> {
        let rows: Vec<BudgetRow> = sqlx::query_as(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budgets \
             WHERE owner_id = ?1 AND (?2 = 0 OR is_active = 1) ORDER BY id"
        ))
        .bind(&filter.owner_id)
        .bind(filter.active_only)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query budgets")?;
        rows.into_iter().map(budget_from_row).collect()
    }

    async fn query_transactions(&self, filter: &TransactionFilter) -> Res<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE owner_id = ?1 AND (?2 IS NULL OR date >= ?2) AND (?3 IS NULL OR date <= ?3) \
             ORDER BY date, id"
        ))
        .bind(&filter.owner_id)
        .bind(filter.date_from.map(|d| d.to_string()))
        .bind(filter.date_to.map(|d| d.to_string()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query transactions")?;

        // Split assignments live inside the JSON column, so that part of the filter runs here.
        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let transaction = transaction_from_row(row)?;
            if filter.matches(&transaction) {
                found.push(transaction);
            }
        }
        Ok(found)
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Res<()> {
        if ops.len() > MAX_BATCH_SIZE {
            bail!(
                "Batch of {} writes exceeds the maximum of {MAX_BATCH_SIZE}",
                ops.len()
            );
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin batch write")?;
        for op in ops {
            match op {
                WriteOp::PutBudget(b) => {
                    sqlx::query(&format!(
                        "INSERT OR REPLACE INTO budgets ({BUDGET_COLUMNS}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                    ))
                    .bind(b.id.as_str())
                    .bind(&b.owner_id)
                    .bind(serde_json::to_string(&b.category_ids)?)
                    .bind(b.amount.plain().to_string())
                    .bind(b.granularity.to_string())
                    .bind(b.start_date.to_string())
                    .bind(b.end_date.map(|d| d.to_string()))
                    .bind(b.is_active)
                    .bind(b.is_catch_all)
                    .bind(b.created_at.to_rfc3339())
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to write {}", op.describe()))?;
                }
                WriteOp::PutTransaction(t) => {
                    sqlx::query(&format!(
                        "INSERT OR REPLACE INTO transactions ({TRANSACTION_COLUMNS}) \
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ))
                    .bind(&t.id)
                    .bind(&t.owner_id)
                    .bind(t.date.to_string())
                    .bind(t.amount.plain().to_string())
                    .bind(serde_json::to_string(&t.splits)?)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to write {}", op.describe()))?;
                }
            }
        }
        tx.commit().await.context("Failed to commit batch write")?;
        debug!("Committed a batch of {} writes", ops.len());
        Ok(())
    }
}

fn budget_from_row(row: BudgetRow) -> Res<Budget> {
    let (
        id,
        owner_id,
        category_ids,
        amount,
        granularity,
        start_date,
        end_date,
        is_active,
        is_catch_all,
        created_at,
    ) = row;
    let category_ids: BTreeSet<String> = serde_json::from_str(&category_ids)
        .with_context(|| format!("Bad category_ids for budget {id}"))?;
    Ok(Budget {
        amount: parse_amount(&amount)?,
        granularity: Granularity::from_str(&granularity)
            .with_context(|| format!("Bad granularity '{granularity}' for budget {id}"))?,
        start_date: parse_date(&start_date)?,
        end_date: end_date.as_deref().map(parse_date).transpose()?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("Bad created_at '{created_at}' for budget {id}"))?
            .with_timezone(&Utc),
        id: BudgetId::new(id),
        owner_id,
        category_ids,
        is_active,
        is_catch_all,
    })
}

fn transaction_from_row(row: TransactionRow) -> Res<Transaction> {
    let (id, owner_id, date, amount, splits) = row;
    let splits: Vec<Split> =
        serde_json::from_str(&splits).with_context(|| format!("Bad splits for transaction {id}"))?;
    let transaction = Transaction::new(id, owner_id, parse_date(&date)?, parse_amount(&amount)?);
    Ok(transaction.with_splits(splits))
}

fn parse_date(s: &str) -> Res<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Bad date '{s}'"))
}

fn parse_amount(s: &str) -> Res<Amount> {
    Amount::from_str(s).with_context(|| format!("Bad amount '{s}'"))
}
