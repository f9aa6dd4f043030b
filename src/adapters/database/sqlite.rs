use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
};

use rusqlite::{
    ffi, params, types::Type, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::ErasedPoisonError;
use crate::{
    domain::{EntryKind, LedgerEntry, LedgerRecord, Member, Product, ProductChanges},
    ports::{
        catalog::{self, CatalogPort},
        ledger::{self, apply_delta, Committed, LedgerPort, LedgerUnit},
        member::{self, MemberPort},
    },
};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS members (
    member_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    loyalty_points INTEGER NOT NULL DEFAULT 0 CHECK (loyalty_points >= 0),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    product_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    price TEXT NOT NULL,
    category TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS loyalty_transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id BLOB NOT NULL UNIQUE,
    member_id BLOB NOT NULL REFERENCES members(member_id),
    product_id BLOB REFERENCES products(product_id),
    points_change INTEGER NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('earned', 'spent')),
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_loyalty_transactions_member
    ON loyalty_transactions (member_id, seq);
"#;

const SELECT_MEMBER: &str = "SELECT member_id, name, email, phone, loyalty_points, created_at
     FROM members WHERE member_id = ?1";

const SELECT_PRODUCT: &str = "SELECT product_id, name, description, price, category, created_at
     FROM products WHERE product_id = ?1";

/// SQLite-backed store
///
/// Every ledger unit runs in an `IMMEDIATE` transaction, which takes the database write lock
/// before the balance is read. Dropping the transaction on an error rolls it back.
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool
    async fn blocking<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<ErasedPoisonError> + From<tokio::task::JoinError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(ErasedPoisonError::from)?;
            f(&mut *conn)
        })
        .await?
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        member_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        loyalty_points: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let price: String = row.get(3)?;
    Ok(Product {
        product_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: Decimal::from_str(&price).map_err(|err| conversion_error(3, err))?,
        category: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerRecord> {
    let kind: String = row.get(4)?;
    let kind = EntryKind::parse(&kind)
        .ok_or_else(|| conversion_error(4, format!("unknown transaction type {kind}")))?;
    let product_price = row
        .get::<_, Option<String>>(8)?
        .map(|price| Decimal::from_str(&price).map_err(|err| conversion_error(8, err)))
        .transpose()?;

    Ok(LedgerRecord {
        entry: LedgerEntry {
            entry_id: row.get(0)?,
            member_id: row.get(1)?,
            product_id: row.get(2)?,
            delta_points: row.get(3)?,
            kind,
            description: row.get(5)?,
            created_at: row.get(6)?,
        },
        product_name: row.get(7)?,
        product_price,
    })
}

fn member_exists(conn: &Connection, member_id: Uuid) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM members WHERE member_id = ?1",
        params![member_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ErrorCode::ConstraintViolation,
                extended_code,
            },
            _,
        ) if *extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait::async_trait]
impl MemberPort for SqliteDatabase {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, member::Error> {
        self.blocking(move |conn| {
            conn.query_row(SELECT_MEMBER, params![member_id], member_from_row)
                .optional()?
                .ok_or(member::Error::MemberDoesNotExist(member_id))
        })
        .await
    }

    async fn create_member(&self, member: Member) -> Result<Member, member::Error> {
        self.blocking(move |conn| {
            let res = conn.execute(
                "INSERT INTO members (member_id, name, email, phone, loyalty_points, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    member.member_id,
                    member.name,
                    member.email,
                    member.phone,
                    member.loyalty_points,
                    member.created_at,
                ],
            );
            match res {
                Ok(_) => {
                    debug!(member_id = %member.member_id, "Stored member");
                    Ok(member)
                }
                Err(err) if is_unique_violation(&err) => {
                    Err(member::Error::EmailTaken(member.email))
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn list_members(&self) -> Result<Vec<Member>, member::Error> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT member_id, name, email, phone, loyalty_points, created_at
                 FROM members ORDER BY created_at DESC, rowid DESC",
            )?;
            let members = stmt
                .query_map([], member_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(members)
        })
        .await
    }
}

#[async_trait::async_trait]
impl CatalogPort for SqliteDatabase {
    async fn get_product(&self, product_id: Uuid) -> Result<Product, catalog::Error> {
        self.blocking(move |conn| {
            conn.query_row(SELECT_PRODUCT, params![product_id], product_from_row)
                .optional()?
                .ok_or(catalog::Error::ProductDoesNotExist(product_id))
        })
        .await
    }

    async fn create_product(&self, product: Product) -> Result<Product, catalog::Error> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO products (product_id, name, description, price, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    product.product_id,
                    product.name,
                    product.description,
                    product.price.to_string(),
                    product.category,
                    product.created_at,
                ],
            )?;
            debug!(product_id = %product.product_id, "Stored product");
            Ok(product)
        })
        .await
    }

    async fn list_products(&self) -> Result<Vec<Product>, catalog::Error> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT product_id, name, description, price, category, created_at
                 FROM products ORDER BY created_at DESC, rowid DESC",
            )?;
            let products = stmt
                .query_map([], product_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(products)
        })
        .await
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, catalog::Error> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE products
                 SET name = COALESCE(?1, name),
                     description = COALESCE(?2, description),
                     price = COALESCE(?3, price),
                     category = COALESCE(?4, category)
                 WHERE product_id = ?5",
                params![
                    changes.name,
                    changes.description,
                    changes.price.map(|price| price.to_string()),
                    changes.category,
                    product_id,
                ],
            )?;
            if updated == 0 {
                return Err(catalog::Error::ProductDoesNotExist(product_id));
            }
            let product = tx.query_row(SELECT_PRODUCT, params![product_id], product_from_row)?;
            tx.commit()?;
            debug!(product_id = %product_id, "Updated product");

            Ok(product)
        })
        .await
    }
}

#[async_trait::async_trait]
impl LedgerPort for SqliteDatabase {
    async fn run_atomic(
        &self,
        member_id: Uuid,
        unit: LedgerUnit,
    ) -> Result<Committed, ledger::Error> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let member = tx
                .query_row(SELECT_MEMBER, params![member_id], member_from_row)
                .optional()?
                .ok_or(ledger::Error::MemberDoesNotExist(member_id))?;
            let draft = unit(&member)?;
            let previous_balance = member.loyalty_points;
            let new_balance = apply_delta(previous_balance, draft.delta_points)?;
            let entry = LedgerEntry::from_draft(member_id, draft);

            tx.execute(
                "UPDATE members SET loyalty_points = ?1 WHERE member_id = ?2",
                params![new_balance, member_id],
            )?;
            tx.execute(
                "INSERT INTO loyalty_transactions
                 (transaction_id, member_id, product_id, points_change, transaction_type, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.entry_id,
                    entry.member_id,
                    entry.product_id,
                    entry.delta_points,
                    entry.kind.as_str(),
                    entry.description,
                    entry.created_at,
                ],
            )?;
            tx.commit()?;
            debug!(
                member_id = %member_id,
                entry_id = %entry.entry_id,
                previous_balance,
                new_balance,
                "Committed ledger unit"
            );

            Ok(Committed {
                previous_balance,
                new_balance,
                entry,
            })
        })
        .await
    }

    async fn list_entries(&self, member_id: Uuid) -> Result<Vec<LedgerRecord>, ledger::Error> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if !member_exists(&tx, member_id)? {
                return Err(ledger::Error::MemberDoesNotExist(member_id));
            }

            let records = {
                let mut stmt = tx.prepare(
                    "SELECT lt.transaction_id, lt.member_id, lt.product_id, lt.points_change,
                            lt.transaction_type, lt.description, lt.created_at,
                            p.name, p.price
                     FROM loyalty_transactions lt
                     LEFT JOIN products p ON lt.product_id = p.product_id
                     WHERE lt.member_id = ?1
                     ORDER BY lt.seq DESC",
                )?;
                let rows = stmt.query_map(params![member_id], record_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;

            Ok(records)
        })
        .await
    }
}
