//! SQLite persistence layer.
//!
//! Stores everything that must survive a restart:
//! - Accounts (cash, holdings, derived total asset)
//! - Leaderboard projection (one row per account)
//! - Pending limit orders
//! - The last mirrored market snapshot
//!
//! Balance changes go through [`SqliteStore::update_account`], which runs the
//! read-modify-write and the leaderboard upsert in one IMMEDIATE transaction.

use crate::error::AppError;
use crate::types::{Holding, LeaderboardEntry, MarketSnapshot, OrderSide, PendingOrder, UserAccount};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of [`SqliteStore::fill_order`].
#[derive(Debug)]
pub enum OrderFill<T> {
    /// Trade applied and order removed.
    Filled(T, UserAccount),
    /// Conditions no longer hold; the order is still pending.
    Declined,
    /// The order was cancelled or already filled.
    Missing,
}

/// SQLite store for accounts, orders and market state.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Persistence("connection lock poisoned".to_string()))
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), AppError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                uid TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                cash REAL NOT NULL,
                principal REAL NOT NULL,
                portfolio_json TEXT NOT NULL DEFAULT '[]',
                total_asset REAL NOT NULL,
                last_reward_at INTEGER,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leaderboard (
                uid TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                total_asset REAL NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_leaderboard_total ON leaderboard(total_asset DESC);

            CREATE TABLE IF NOT EXISTS pending_orders (
                id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                stock_id TEXT NOT NULL,
                side TEXT NOT NULL,
                target_price REAL NOT NULL,
                amount INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pending_orders_uid ON pending_orders(uid);

            CREATE TABLE IF NOT EXISTS market_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            );",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Account Methods ==========

    /// Insert a new account; an existing account with the same uid is kept.
    pub fn create_account(&self, account: &UserAccount) -> Result<UserAccount, AppError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = read_account(&tx, &account.uid)? {
            return Ok(existing);
        }

        write_account(&tx, account)?;
        upsert_leaderboard(&tx, &account.to_leaderboard_entry())?;
        tx.commit()?;

        info!("Created account {}", account.uid);
        Ok(account.clone())
    }

    pub fn get_account(&self, uid: &str) -> Result<Option<UserAccount>, AppError> {
        let conn = self.lock()?;
        read_account(&conn, uid)
    }

    /// Atomically read, mutate and write an account plus its leaderboard row.
    ///
    /// If `mutate` fails nothing is written. Concurrent callers for the same
    /// account are serialized.
    pub fn update_account<T, F>(&self, uid: &str, mutate: F) -> Result<(T, UserAccount), AppError>
    where
        F: FnOnce(&mut UserAccount) -> Result<T, AppError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((output, account)) = mutate_account(&tx, uid, |account| mutate(account).map(Some))?
        else {
            return Err(AppError::Persistence(format!("update of {} produced no result", uid)));
        };

        tx.commit()?;
        Ok((output, account))
    }

    /// Consume a pending order and apply its trade in one transaction.
    ///
    /// The order row is deleted in the same IMMEDIATE transaction as the
    /// account write, so a cancelled order can never trade and a filled order
    /// can never be cancelled. When `mutate` returns `Ok(None)` or an error
    /// the transaction rolls back and the order stays pending.
    pub fn fill_order<T, F>(&self, order: &PendingOrder, mutate: F) -> Result<OrderFill<T>, AppError>
    where
        F: FnOnce(&mut UserAccount) -> Result<Option<T>, AppError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute("DELETE FROM pending_orders WHERE id = ?1", params![order.id])?;
        if removed == 0 {
            return Ok(OrderFill::Missing);
        }

        match mutate_account(&tx, &order.uid, mutate)? {
            Some((output, account)) => {
                tx.commit()?;
                Ok(OrderFill::Filled(output, account))
            }
            None => Ok(OrderFill::Declined),
        }
    }

    pub fn account_count(&self) -> Result<usize, AppError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Leaderboard Methods ==========

    /// Top entries by total asset.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT uid, user_id, total_asset, updated_at
             FROM leaderboard ORDER BY total_asset DESC, updated_at ASC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LeaderboardEntry {
                uid: row.get(0)?,
                user_id: row.get(1)?,
                total_asset: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn leaderboard_entry(&self, uid: &str) -> Result<Option<LeaderboardEntry>, AppError> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                "SELECT uid, user_id, total_asset, updated_at FROM leaderboard WHERE uid = ?1",
                params![uid],
                |row| {
                    Ok(LeaderboardEntry {
                        uid: row.get(0)?,
                        user_id: row.get(1)?,
                        total_asset: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    // ========== Pending Order Methods ==========

    pub fn insert_order(&self, order: &PendingOrder) -> Result<(), AppError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_orders (id, uid, stock_id, side, target_price, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                order.id,
                order.uid,
                order.stock_id,
                order.side.to_string(),
                order.target_price,
                order.amount as i64,
                order.created_at,
            ],
        )?;
        debug!("Stored pending order {} for {}", order.id, order.uid);
        Ok(())
    }

    pub fn get_order(&self, id: &str) -> Result<Option<PendingOrder>, AppError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, uid, stock_id, side, target_price, amount, created_at
             FROM pending_orders WHERE id = ?1",
            params![id],
            order_from_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Orders for one user, newest first.
    pub fn orders_for_user(&self, uid: &str) -> Result<Vec<PendingOrder>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, uid, stock_id, side, target_price, amount, created_at
             FROM pending_orders WHERE uid = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![uid], order_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every standing order, oldest first.
    pub fn all_orders(&self) -> Result<Vec<PendingOrder>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, uid, stock_id, side, target_price, amount, created_at
             FROM pending_orders ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], order_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns whether an order was removed.
    pub fn delete_order(&self, id: &str) -> Result<bool, AppError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM pending_orders WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    // ========== Market Snapshot Methods ==========

    /// Overwrite the mirrored market state.
    pub fn save_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<(), AppError> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO market_snapshot (id, snapshot_json, last_updated) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                last_updated = excluded.last_updated",
            params![json, snapshot.last_updated],
        )?;
        Ok(())
    }

    pub fn load_market_snapshot(&self) -> Result<Option<MarketSnapshot>, AppError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot_json FROM market_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Tick the last mirrored snapshot reached, if it can still be read.
    ///
    /// An unreadable snapshot (older schema, corrupt row) is logged and
    /// treated as absent.
    pub fn previous_game_time(&self) -> Option<u64> {
        match self.load_market_snapshot() {
            Ok(snapshot) => snapshot.map(|s| s.game_time),
            Err(e) => {
                warn!("Ignoring unreadable market snapshot: {}", e);
                None
            }
        }
    }
}

/// Read-modify-write inside an open transaction. `Ok(None)` from `mutate`
/// means "write nothing".
fn mutate_account<T, F>(
    conn: &Connection,
    uid: &str,
    mutate: F,
) -> Result<Option<(T, UserAccount)>, AppError>
where
    F: FnOnce(&mut UserAccount) -> Result<Option<T>, AppError>,
{
    let mut account = read_account(conn, uid)?
        .ok_or_else(|| AppError::NotFound(format!("account {}", uid)))?;

    let Some(output) = mutate(&mut account)? else {
        return Ok(None);
    };
    account.updated_at = chrono::Utc::now().timestamp_millis();

    write_account(conn, &account)?;
    upsert_leaderboard(conn, &account.to_leaderboard_entry())?;
    Ok(Some((output, account)))
}

fn read_account(conn: &Connection, uid: &str) -> Result<Option<UserAccount>, AppError> {
    let row = conn
        .query_row(
            "SELECT uid, user_id, cash, principal, portfolio_json, total_asset, last_reward_at, updated_at
             FROM accounts WHERE uid = ?1",
            params![uid],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((uid, user_id, cash, principal, portfolio_json, total_asset, last_reward_at, updated_at)) =
        row
    else {
        return Ok(None);
    };

    let portfolio: Vec<Holding> = serde_json::from_str(&portfolio_json)?;

    Ok(Some(UserAccount {
        uid,
        user_id,
        cash,
        principal,
        portfolio,
        total_asset,
        last_reward_at,
        updated_at,
    }))
}

fn write_account(conn: &Connection, account: &UserAccount) -> Result<(), AppError> {
    let portfolio_json = serde_json::to_string(&account.portfolio)?;
    conn.execute(
        "INSERT INTO accounts (uid, user_id, cash, principal, portfolio_json, total_asset, last_reward_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(uid) DO UPDATE SET
            user_id = excluded.user_id,
            cash = excluded.cash,
            principal = excluded.principal,
            portfolio_json = excluded.portfolio_json,
            total_asset = excluded.total_asset,
            last_reward_at = excluded.last_reward_at,
            updated_at = excluded.updated_at",
        params![
            account.uid,
            account.user_id,
            account.cash,
            account.principal,
            portfolio_json,
            account.total_asset,
            account.last_reward_at,
            account.updated_at,
        ],
    )?;
    Ok(())
}

fn upsert_leaderboard(conn: &Connection, entry: &LeaderboardEntry) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO leaderboard (uid, user_id, total_asset, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(uid) DO UPDATE SET
            user_id = excluded.user_id,
            total_asset = excluded.total_asset,
            updated_at = excluded.updated_at",
        params![entry.uid, entry.user_id, entry.total_asset, entry.updated_at],
    )?;
    Ok(())
}

fn order_from_row(row: &Row<'_>) -> Result<PendingOrder, rusqlite::Error> {
    let side: String = row.get(3)?;
    let side: OrderSide = side.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    let amount: i64 = row.get(5)?;

    Ok(PendingOrder {
        id: row.get(0)?,
        uid: row.get(1)?,
        stock_id: row.get(2)?,
        side,
        target_price: row.get(4)?,
        amount: amount.max(0) as u64,
        created_at: row.get(6)?,
    })
}
