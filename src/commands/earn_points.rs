use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{points_for_purchase, EntryKind, LedgerDraft, LedgerEntry, Member},
    ports::{
        catalog::CatalogPort,
        ledger::{self, LedgerPort},
        member::MemberPort,
    },
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::info;
use uuid::Uuid;

use super::{DomainLogic, Error};

/// A member buys `quantity` units of a product and earns points for it
#[derive(Clone, Debug, Deserialize)]
pub struct EarnPointsRequest {
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseSummary {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub total_amount: Decimal,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct EarnPointsResponse {
    pub member_id: Uuid,
    pub purchase: PurchaseSummary,
    pub points_earned: u32,
    /// Previous number of loyalty points
    pub previous_balance: u32,
    /// New number of loyalty points
    pub new_balance: u32,
    pub entry: LedgerEntry,
}

impl<L, M, C> Service<EarnPointsRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = EarnPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EarnPointsRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        let member = self.member.clone();
        let catalog = self.catalog.clone();
        let currency = self.currency.clone();
        Box::pin(async move {
            if req.quantity <= 0 {
                return Err(Error::InvalidInput("quantity must be greater than 0".into()));
            }
            let quantity = u32::try_from(req.quantity)
                .map_err(|_| Error::InvalidInput("quantity is out of range".into()))?;

            // Fetch necessary data
            let member = member.get_member(req.member_id).await?;
            let product = catalog.get_product(req.product_id).await?;

            let total_amount = product
                .price
                .checked_mul(Decimal::from(quantity))
                .ok_or(Error::InvalidInput("purchase total is out of range".into()))?;
            let points_earned = points_for_purchase(total_amount)
                .ok_or(Error::InvalidInput("purchase total is out of range".into()))?;
            let delta_points = i32::try_from(points_earned)
                .map_err(|_| Error::InvalidInput("purchase total is out of range".into()))?;

            let draft = LedgerDraft {
                product_id: Some(product.product_id),
                delta_points,
                kind: EntryKind::Earned,
                description: format!(
                    "Purchase: {quantity}x {} ({total_amount} {currency})",
                    product.name
                ),
            };
            // A zero-point purchase is still recorded in the ledger
            let unit = Box::new(move |_: &Member| Ok::<_, ledger::Error>(draft));
            let committed = ledger.run_atomic(member.member_id, unit).await?;

            info!(
                member_id = %member.member_id,
                product_id = %product.product_id,
                quantity,
                %total_amount,
                points_earned,
                new_balance = committed.new_balance,
                "Points earned"
            );

            Ok(EarnPointsResponse {
                member_id: member.member_id,
                purchase: PurchaseSummary {
                    product_id: product.product_id,
                    product_name: product.name,
                    unit_price: product.price,
                    quantity,
                    total_amount,
                },
                points_earned,
                previous_balance: committed.previous_balance,
                new_balance: committed.new_balance,
                entry: committed.entry,
            })
        })
    }
}
