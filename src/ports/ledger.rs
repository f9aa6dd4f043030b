use uuid::Uuid;

use crate::domain::{LedgerDraft, LedgerEntry, LedgerRecord, Member};

/// Work executed inside a ledger unit
///
/// The closure receives the member as currently stored, with its row locked for the duration of
/// the unit, and returns the entry to append. Returning an error aborts the unit without any
/// visible change.
pub type LedgerUnit = Box<dyn FnOnce(&Member) -> Result<LedgerDraft, Error> + Send>;

#[mockall::automock]
#[async_trait::async_trait]
pub trait LedgerPort {
    /// Apply a balance change and append its ledger entry as one atomic unit
    ///
    /// Either both the balance update and the new entry become visible, or neither does.
    /// Concurrent units against the same member are serialized.
    async fn run_atomic(&self, member_id: Uuid, unit: LedgerUnit) -> Result<Committed, Error>;

    /// All entries for a member, most recent first, joined with their product
    async fn list_entries(&self, member_id: Uuid) -> Result<Vec<LedgerRecord>, Error>;
}

/// Result of a committed ledger unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committed {
    pub previous_balance: u32,
    pub new_balance: u32,
    pub entry: LedgerEntry,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Trying to redeem more points than the member holds
    #[error("insufficient points: member has {current_points}, trying to redeem {requested_points}")]
    InsufficientBalance {
        current_points: u32,
        requested_points: u32,
    },

    /// Trying to remove too many loyalty points
    ///
    /// This would result in a negative number of loyalty points, which is not supported.
    #[error("trying to subtract too many points: {delta_points} from {current_points}")]
    NegativePointsTotal {
        current_points: u32,
        delta_points: i32,
    },

    /// The new balance would not fit in the points counter
    #[error("points overflow: {delta_points} added to {current_points}")]
    PointsOverflow {
        current_points: u32,
        delta_points: i32,
    },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}

/// New balance after applying `delta_points` to `current_points`
pub fn apply_delta(current_points: u32, delta_points: i32) -> Result<u32, Error> {
    let new_points = current_points as i64 + delta_points as i64;
    if new_points < 0 {
        return Err(Error::NegativePointsTotal {
            current_points,
            delta_points,
        });
    }
    u32::try_from(new_points).map_err(|_| Error::PointsOverflow {
        current_points,
        delta_points,
    })
}
