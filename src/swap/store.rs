use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::{LockupTransaction, ReverseSwapRecord, SwapState};

const SELECT_SWAP: &str = r#"
SELECT
  id,
  redeem_script_hex,
  timeout_block_height,
  invoice,
  onchain_amount,
  lockup_address,
  preimage_hex,
  private_key_hex,
  status,
  lockup_txid,
  lockup_raw_hex,
  lockup_eta,
  lockup_vout,
  lockup_amount,
  lockup_confirmed,
  claim_txid
FROM reverse_swaps
"#;

/// Local persistence for reverse swaps across the lockup wait.
///
/// Rows hold the preimage and claim key, so the database file must be protected like a wallet.
#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_swap(&mut self, record: &ReverseSwapRecord) -> Result<()> {
        let lockup = LockupColumns::from(record.lockup.as_ref());
        self.conn
            .execute(
                r#"
INSERT INTO reverse_swaps (
  id,
  redeem_script_hex,
  timeout_block_height,
  invoice,
  onchain_amount,
  lockup_address,
  preimage_hex,
  private_key_hex,
  status,
  lockup_txid,
  lockup_raw_hex,
  lockup_eta,
  lockup_vout,
  lockup_amount,
  lockup_confirmed,
  claim_txid
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
)
"#,
                params![
                    &record.id,
                    &record.redeem_script_hex,
                    record.timeout_block_height,
                    &record.invoice,
                    sql_u64(record.onchain_amount)?,
                    &record.lockup_address,
                    &record.preimage_hex,
                    &record.private_key_hex,
                    record.status.as_str(),
                    lockup.txid,
                    lockup.raw_hex,
                    lockup.eta,
                    lockup.vout,
                    lockup.amount,
                    lockup.confirmed,
                    &record.claim_txid,
                ],
            )
            .with_context(|| format!("insert swap {}", record.id))?;
        Ok(())
    }

    /// Writes back the fields the engine moves: status, lockup and claim txid.
    pub fn update_swap(&mut self, record: &ReverseSwapRecord) -> Result<()> {
        let lockup = LockupColumns::from(record.lockup.as_ref());
        let rows = self
            .conn
            .execute(
                r#"
UPDATE reverse_swaps SET
  status = ?2,
  lockup_txid = ?3,
  lockup_raw_hex = ?4,
  lockup_eta = ?5,
  lockup_vout = ?6,
  lockup_amount = ?7,
  lockup_confirmed = ?8,
  claim_txid = ?9
WHERE id = ?1
"#,
                params![
                    &record.id,
                    record.status.as_str(),
                    lockup.txid,
                    lockup.raw_hex,
                    lockup.eta,
                    lockup.vout,
                    lockup.amount,
                    lockup.confirmed,
                    &record.claim_txid,
                ],
            )
            .with_context(|| format!("update swap {}", record.id))?;
        anyhow::ensure!(rows == 1, "swap not found: {}", record.id);
        Ok(())
    }

    pub fn get_swap(&self, id: &str) -> Result<Option<ReverseSwapRecord>> {
        self.conn
            .query_row(
                &format!("{SELECT_SWAP} WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()
            .with_context(|| format!("get swap {id}"))
    }

    pub fn list_swaps(&self) -> Result<Vec<ReverseSwapRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SWAP} ORDER BY id"))
            .context("prepare list swaps")?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map([], row_to_record)
            .context("query list swaps")?;
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }
}

struct LockupColumns<'a> {
    txid: Option<&'a str>,
    raw_hex: Option<&'a str>,
    eta: Option<u32>,
    vout: Option<u32>,
    amount: Option<i64>,
    confirmed: Option<bool>,
}

impl<'a> From<Option<&'a LockupTransaction>> for LockupColumns<'a> {
    fn from(lockup: Option<&'a LockupTransaction>) -> Self {
        Self {
            txid: lockup.map(|l| l.txid.as_str()),
            raw_hex: lockup.map(|l| l.raw_hex.as_str()),
            eta: lockup.and_then(|l| l.eta),
            vout: lockup.map(|l| l.vout),
            // Amounts are bounded by the 21M BTC supply.
            amount: lockup.map(|l| l.amount as i64),
            confirmed: lockup.map(|l| l.confirmed),
        }
    }
}

fn sql_u64(v: u64) -> Result<i64> {
    i64::try_from(v).with_context(|| format!("value out of sqlite range: {v}"))
}

fn conversion_error(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Integer, msg.into())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ReverseSwapRecord> {
    let timeout_block_height: i64 = row.get(2)?;
    let onchain_amount: i64 = row.get(4)?;
    let status_str: String = row.get(8)?;
    let status = status_from_str(&status_str, 8)?;

    let lockup_txid: Option<String> = row.get(9)?;
    let lockup = match lockup_txid {
        None => None,
        Some(txid) => {
            let vout: i64 = row.get(12)?;
            let amount: i64 = row.get(13)?;
            Some(LockupTransaction {
                txid,
                raw_hex: row.get(10)?,
                eta: row.get(11)?,
                vout: u32::try_from(vout)
                    .map_err(|_| conversion_error(12, format!("invalid lockup_vout {vout}")))?,
                amount: u64::try_from(amount)
                    .map_err(|_| conversion_error(13, format!("invalid lockup_amount {amount}")))?,
                confirmed: row.get(14)?,
            })
        }
    };

    Ok(ReverseSwapRecord {
        id: row.get(0)?,
        redeem_script_hex: row.get(1)?,
        timeout_block_height: u32::try_from(timeout_block_height).map_err(|_| {
            conversion_error(
                2,
                format!("invalid timeout_block_height {timeout_block_height}"),
            )
        })?,
        invoice: row.get(3)?,
        onchain_amount: u64::try_from(onchain_amount).map_err(|_| {
            conversion_error(4, format!("invalid onchain_amount {onchain_amount}"))
        })?,
        lockup_address: row.get(5)?,
        preimage_hex: row.get(6)?,
        private_key_hex: row.get(7)?,
        status,
        lockup,
        claim_txid: row.get(15)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS reverse_swaps (
  id TEXT PRIMARY KEY,
  redeem_script_hex TEXT NOT NULL,
  timeout_block_height INTEGER NOT NULL,
  invoice TEXT NOT NULL,
  onchain_amount INTEGER NOT NULL,
  lockup_address TEXT NOT NULL,
  preimage_hex TEXT NOT NULL,
  private_key_hex TEXT NOT NULL,
  status TEXT NOT NULL,
  lockup_txid TEXT,
  lockup_raw_hex TEXT,
  lockup_eta INTEGER,
  lockup_vout INTEGER,
  lockup_amount INTEGER,
  lockup_confirmed INTEGER,
  claim_txid TEXT
);
CREATE INDEX IF NOT EXISTS reverse_swaps_status_idx ON reverse_swaps(status);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn status_from_str(s: &str, col: usize) -> rusqlite::Result<SwapState> {
    SwapState::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown swap status: {s}").into(),
        )
    })
}
