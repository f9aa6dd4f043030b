use std::{borrow::Cow, sync::Arc};

use uuid::Uuid;

use crate::ports::{catalog, ledger, member};

pub mod admin;
pub mod earn_points;
pub mod list_transactions;
pub mod redeem_points;

/// Currency label used in ledger descriptions when none is configured
pub const DEFAULT_CURRENCY: &str = "taka";

/// Entry point for all operations, implemented as [`tower::Service`]s on request types
pub struct DomainLogic<L, M, C> {
    ledger: Arc<L>,
    member: Arc<M>,
    catalog: Arc<C>,
    currency: Arc<str>,
}

impl<L, M, C> DomainLogic<L, M, C> {
    pub fn new(ledger: Arc<L>, member: Arc<M>, catalog: Arc<C>) -> Self {
        Self {
            ledger,
            member,
            catalog,
            currency: DEFAULT_CURRENCY.into(),
        }
    }

    /// Currency name written into ledger descriptions
    pub fn with_currency(mut self, currency: impl Into<Arc<str>>) -> Self {
        self.currency = currency.into();
        self
    }
}

impl<L, M, C> Clone for DomainLogic<L, M, C> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            member: self.member.clone(),
            catalog: self.catalog.clone(),
            currency: self.currency.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Request field is missing, malformed or out of range
    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),

    #[error("member {0} does not exist")]
    MemberNotFound(Uuid),
    #[error("product {0} does not exist")]
    ProductNotFound(Uuid),

    #[error("insufficient points: member has {current_points}, trying to redeem {requested_points}")]
    InsufficientBalance {
        current_points: u32,
        requested_points: u32,
    },

    /// Registration clashes with an existing record
    #[error("conflict: {0}")]
    Conflict(Cow<'static, str>),

    /// The store could not be reached or the ledger unit could not commit
    #[error("storage failure: {0:?}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification of an [`Error`], used by outer layers to pick a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    InsufficientBalance,
    Conflict,
    StorageFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::MemberNotFound(_) | Error::ProductNotFound(_) => ErrorKind::NotFound,
            Error::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<member::Error> for Error {
    fn from(err: member::Error) -> Self {
        match err {
            member::Error::MemberDoesNotExist(member_id) => Error::MemberNotFound(member_id),
            member::Error::EmailTaken(email) => {
                Error::Conflict(format!("email {email} is already registered").into())
            }
            member::Error::Adapter(err) => Error::Storage(err),
        }
    }
}

impl From<catalog::Error> for Error {
    fn from(err: catalog::Error) -> Self {
        match err {
            catalog::Error::ProductDoesNotExist(product_id) => Error::ProductNotFound(product_id),
            catalog::Error::Adapter(err) => Error::Storage(err),
        }
    }
}

impl From<ledger::Error> for Error {
    fn from(err: ledger::Error) -> Self {
        match err {
            ledger::Error::MemberDoesNotExist(member_id) => Error::MemberNotFound(member_id),
            ledger::Error::InsufficientBalance {
                current_points,
                requested_points,
            } => Error::InsufficientBalance {
                current_points,
                requested_points,
            },
            ledger::Error::NegativePointsTotal {
                current_points,
                delta_points,
            } => Error::InsufficientBalance {
                current_points,
                requested_points: delta_points.unsigned_abs(),
            },
            err @ ledger::Error::PointsOverflow { .. } => {
                Error::InvalidInput(err.to_string().into())
            }
            ledger::Error::Adapter(err) => Error::Storage(err),
        }
    }
}

/// Shared checks for the commands' integration tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::DomainLogic;
    use crate::{
        adapters::database::{memory::MemoryDatabase, sqlite::SqliteDatabase},
        domain::{ledger_total, Member, Product},
        ports::{catalog::CatalogPort, ledger::LedgerPort, member::MemberPort},
    };

    pub type MemoryLogic = DomainLogic<MemoryDatabase, MemoryDatabase, MemoryDatabase>;
    pub type SqliteLogic = DomainLogic<SqliteDatabase, SqliteDatabase, SqliteDatabase>;

    pub fn memory_logic() -> (MemoryLogic, MemoryDatabase) {
        let database = MemoryDatabase::default();
        let shared = Arc::new(database.clone());
        (
            DomainLogic::new(shared.clone(), shared.clone(), shared),
            database,
        )
    }

    pub fn sqlite_logic() -> (SqliteLogic, SqliteDatabase) {
        let database = SqliteDatabase::open_in_memory().unwrap();
        let shared = Arc::new(database.clone());
        (
            DomainLogic::new(shared.clone(), shared.clone(), shared),
            database,
        )
    }

    pub async fn seed_member<D: MemberPort>(database: &D) -> Member {
        database
            .create_member(Member::new(
                "Ayesha".to_string(),
                format!("{}@example.com", uuid::Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap()
    }

    pub async fn seed_product<D: CatalogPort>(
        database: &D,
        name: &str,
        price: Decimal,
    ) -> Product {
        database
            .create_product(Product::new(name.to_string(), None, price, None))
            .await
            .unwrap()
    }

    /// Balance and ledger of a member must always agree
    pub async fn assert_reconciled<D: MemberPort + LedgerPort>(
        database: &D,
        member_id: uuid::Uuid,
    ) {
        let member = database.get_member(member_id).await.unwrap();
        let entries = database.list_entries(member_id).await.unwrap();
        let total = ledger_total(entries.iter().map(|record| &record.entry));
        assert_eq!(member.loyalty_points as i64, total);
    }
}
