use uuid::Uuid;

use crate::domain::Member;

#[mockall::automock]
#[async_trait::async_trait]
pub trait MemberPort {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error>;
    /// Store a newly registered member
    async fn create_member(&self, member: Member) -> Result<Member, Error>;
    /// All members, most recently registered first
    async fn list_members(&self) -> Result<Vec<Member>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a member does not exist
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Another member already uses this email address
    #[error("email {0} is already registered")]
    EmailTaken(String),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
