use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::LedgerRecord,
    ports::{catalog::CatalogPort, ledger::LedgerPort, member::MemberPort},
};
use serde::{Deserialize, Serialize};
use tower::Service;
use uuid::Uuid;

use super::{DomainLogic, Error};

#[derive(Clone, Debug, Deserialize)]
pub struct ListTransactionsRequest {
    pub member_id: Uuid,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ListTransactionsResponse {
    pub member_id: Uuid,
    pub count: usize,
    /// Most recent first
    pub transactions: Vec<LedgerRecord>,
}

impl<L, M, C> Service<ListTransactionsRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = ListTransactionsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListTransactionsRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        Box::pin(async move {
            let transactions = ledger.list_entries(req.member_id).await?;
            Ok(ListTransactionsResponse {
                member_id: req.member_id,
                count: transactions.len(),
                transactions,
            })
        })
    }
}
