use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{EntryKind, LedgerDraft, LedgerEntry, Member, Redemption},
    ports::{
        catalog::CatalogPort,
        ledger::{self, LedgerPort},
        member::MemberPort,
    },
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::{info, warn};
use uuid::Uuid;

use super::{DomainLogic, Error};

/// A member trades points for a discount on a purchase
#[derive(Clone, Debug, Deserialize)]
pub struct RedeemPointsRequest {
    pub member_id: Uuid,
    pub points_to_redeem: i64,
    pub purchase_amount: Decimal,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RedeemPointsResponse {
    pub member_id: Uuid,
    pub redemption: Redemption,
    /// Previous number of loyalty points
    pub previous_balance: u32,
    /// New number of loyalty points
    pub new_balance: u32,
    pub entry: LedgerEntry,
}

impl<L, M, C> Service<RedeemPointsRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = RedeemPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RedeemPointsRequest) -> Self::Future {
        let ledger = self.ledger.clone();
        let currency = self.currency.clone();
        Box::pin(async move {
            let points = validate_points(req.points_to_redeem)?;
            if req.purchase_amount <= Decimal::ZERO {
                return Err(Error::InvalidInput(
                    "purchase amount must be greater than 0".into(),
                ));
            }

            let redemption = Redemption::compute(points, req.purchase_amount);
            let description = format!(
                "Redeemed {points} points for {} {currency} discount on purchase of {} {currency}",
                redemption.discount_amount, redemption.original_amount
            );

            // The balance check runs inside the unit so that it sees the locked balance
            let unit = Box::new(move |member: &Member| {
                if member.loyalty_points < points {
                    return Err(ledger::Error::InsufficientBalance {
                        current_points: member.loyalty_points,
                        requested_points: points,
                    });
                }
                Ok(LedgerDraft {
                    product_id: None,
                    delta_points: -(points as i32),
                    kind: EntryKind::Spent,
                    description,
                })
            });
            let committed = ledger
                .run_atomic(req.member_id, unit)
                .await
                .map_err(Error::from)
                .map_err(|err| {
                    if let Error::InsufficientBalance { current_points, .. } = &err {
                        warn!(
                            member_id = %req.member_id,
                            current_points,
                            requested_points = points,
                            "Redemption rejected"
                        );
                    }
                    err
                })?;

            if redemption.excess_points > 0 {
                // Kept as-is: the full amount is debited even though part of it buys nothing
                warn!(
                    member_id = %req.member_id,
                    points_redeemed = points,
                    excess_points = redemption.excess_points,
                    purchase_amount = %redemption.original_amount,
                    "Redeemed points exceed purchase amount"
                );
            }
            info!(
                member_id = %req.member_id,
                points_redeemed = points,
                discount_amount = %redemption.discount_amount,
                final_amount = %redemption.final_amount,
                new_balance = committed.new_balance,
                "Points redeemed"
            );

            Ok(RedeemPointsResponse {
                member_id: req.member_id,
                redemption,
                previous_balance: committed.previous_balance,
                new_balance: committed.new_balance,
                entry: committed.entry,
            })
        })
    }
}

/// Points must be positive and small enough to be debited as a single delta
///
/// Ledger deltas are `i32`, so a single redemption is capped at `i32::MAX` points even though a
/// balance can grow past that.
fn validate_points(points_to_redeem: i64) -> Result<u32, Error> {
    if points_to_redeem <= 0 {
        return Err(Error::InvalidInput(
            "points to redeem must be greater than 0".into(),
        ));
    }
    i32::try_from(points_to_redeem)
        .map(|points| points.unsigned_abs())
        .map_err(|_| Error::InvalidInput("points to redeem is out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{earn_points::EarnPointsRequest, testing::*, ErrorKind},
        ports::{catalog::MockCatalogPort, ledger::MockLedgerPort, member::MockMemberPort},
    };
    use rstest::*;
    use rust_decimal_macros::dec;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    /// Member holding `points`, credited through a regular purchase
    async fn member_with_points<L, M, C>(
        domain: &DomainLogic<L, M, C>,
        database: &M,
        points: u32,
    ) -> Result<Member, BoxError>
    where
        L: LedgerPort + Send + Sync + 'static,
        M: MemberPort + CatalogPort + Send + Sync + 'static,
        C: CatalogPort + Send + Sync + 'static,
    {
        let member = seed_member(database).await;
        let product = seed_product(database, "Beans", dec!(50)).await;
        domain
            .clone()
            .oneshot(EarnPointsRequest {
                member_id: member.member_id,
                product_id: product.product_id,
                quantity: points as i64,
            })
            .await?;
        Ok(member)
    }

    #[rstest]
    #[case(30, dec!(100), dec!(70), 20)]
    #[case(50, dec!(100), dec!(50), 0)]
    #[case(1, dec!(0.50), dec!(0), 49)]
    #[tokio::test]
    async fn test_call(
        #[case] points_to_redeem: i64,
        #[case] purchase_amount: Decimal,
        #[case] final_amount: Decimal,
        #[case] new_balance: u32,
    ) -> Result<(), BoxError> {
        // GIVEN a member with 50 points
        let (domain, database) = memory_logic();
        let member = member_with_points(&domain, &database, 50).await?;

        // WHEN redeeming points
        let res = domain
            .clone()
            .oneshot(RedeemPointsRequest {
                member_id: member.member_id,
                points_to_redeem,
                purchase_amount,
            })
            .await?;

        // THEN the discount is applied and the points debited
        assert_that!(res.redemption.discount_amount)
            .is_equal_to(Decimal::from(points_to_redeem));
        assert_that!(res.redemption.final_amount).is_equal_to(final_amount);
        assert_that!(res.previous_balance).is_equal_to(50);
        assert_that!(res.new_balance).is_equal_to(new_balance);
        assert_that!(res.entry.delta_points).is_equal_to(-(points_to_redeem as i32));
        assert_that!(res.entry.kind).is_equal_to(EntryKind::Spent);
        assert_that!(res.entry.product_id).is_none();
        assert_reconciled(&database, member.member_id).await;

        Ok(())
    }

    #[tokio::test]
    async fn test_call_description() -> Result<(), BoxError> {
        let (domain, database) = sqlite_logic();
        let member = member_with_points(&domain, &database, 50).await?;

        let res = domain
            .clone()
            .oneshot(RedeemPointsRequest {
                member_id: member.member_id,
                points_to_redeem: 30,
                purchase_amount: dec!(100),
            })
            .await?;

        assert_that!(res.entry.description.as_str())
            .is_equal_to("Redeemed 30 points for 30 taka discount on purchase of 100 taka");
        Ok(())
    }

    #[tokio::test]
    async fn test_call_exceeding_purchase_debits_everything() -> Result<(), BoxError> {
        let (domain, database) = memory_logic();
        let member = member_with_points(&domain, &database, 50).await?;

        let res = domain
            .clone()
            .oneshot(RedeemPointsRequest {
                member_id: member.member_id,
                points_to_redeem: 40,
                purchase_amount: dec!(25),
            })
            .await?;

        assert_that!(res.redemption.final_amount).is_equal_to(Decimal::ZERO);
        assert_that!(res.redemption.excess_points).is_equal_to(15);
        assert_that!(res.new_balance).is_equal_to(10);
        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_insufficient_balance(
        #[values(true, false)] use_sqlite: bool,
    ) -> Result<(), BoxError> {
        // GIVEN a member with 50 points
        async fn run<L, M, C>(
            domain: DomainLogic<L, M, C>,
            database: &M,
        ) -> Result<(), BoxError>
        where
            L: LedgerPort + Send + Sync + 'static,
            M: MemberPort + LedgerPort + CatalogPort + Send + Sync + 'static,
            C: CatalogPort + Send + Sync + 'static,
        {
            let member = member_with_points(&domain, database, 50).await?;

            // WHEN redeeming more than the balance
            let res = domain
                .clone()
                .oneshot(RedeemPointsRequest {
                    member_id: member.member_id,
                    points_to_redeem: 80,
                    purchase_amount: dec!(100),
                })
                .await;

            // THEN it is rejected and nothing changes
            assert_that!(res).is_err().matches(|err| {
                matches!(
                    err,
                    Error::InsufficientBalance {
                        current_points: 50,
                        requested_points: 80
                    }
                )
            });
            let stored = database.get_member(member.member_id).await?;
            let entries = database.list_entries(member.member_id).await?;
            assert_that!(stored.loyalty_points).is_equal_to(50);
            assert_that!(entries).has_length(1);
            assert_reconciled(database, member.member_id).await;
            Ok(())
        }

        if use_sqlite {
            let (domain, database) = sqlite_logic();
            run(domain, &database).await
        } else {
            let (domain, database) = memory_logic();
            run(domain, &database).await
        }
    }

    #[tokio::test]
    async fn test_call_missing_member() {
        let (domain, _) = memory_logic();
        let member_id = Uuid::new_v4();

        let res = domain
            .clone()
            .oneshot(RedeemPointsRequest {
                member_id,
                points_to_redeem: 1,
                purchase_amount: dec!(10),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::NotFound);
    }

    #[rstest]
    #[case(0, dec!(100), "points to redeem must be greater than 0")]
    #[case(-5, dec!(100), "points to redeem must be greater than 0")]
    #[case(i64::from(i32::MAX) + 1, dec!(100), "points to redeem is out of range")]
    #[case(i64::MAX, dec!(100), "points to redeem is out of range")]
    #[case(10, dec!(0), "purchase amount must be greater than 0")]
    #[case(10, dec!(-3), "purchase amount must be greater than 0")]
    #[tokio::test]
    async fn test_call_invalid_input(
        #[case] points_to_redeem: i64,
        #[case] purchase_amount: Decimal,
        #[case] message: &str,
    ) {
        // GIVEN a ledger that must never be reached
        let mut ledger = MockLedgerPort::new();
        ledger.expect_run_atomic().times(0);
        let domain = DomainLogic::new(
            Arc::new(ledger),
            Arc::new(MockMemberPort::new()),
            Arc::new(MockCatalogPort::new()),
        );

        let res = domain
            .clone()
            .oneshot(RedeemPointsRequest {
                member_id: Uuid::new_v4(),
                points_to_redeem,
                purchase_amount,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidInput(msg) if msg == message));
    }

    /// Earn and redeem calls racing on one member must not lose updates
    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls(
        #[values(true, false)] use_sqlite: bool,
    ) -> Result<(), BoxError> {
        async fn run<L, M, C>(domain: DomainLogic<L, M, C>, database: M) -> Result<(), BoxError>
        where
            L: LedgerPort + Send + Sync + 'static,
            M: MemberPort + LedgerPort + CatalogPort + Send + Sync + 'static,
            C: CatalogPort + Send + Sync + 'static,
        {
            // GIVEN a member with 100 points
            let member = member_with_points(&domain, &database, 100).await?;
            let product = seed_product(&database, "Espresso", dec!(250)).await;

            // WHEN 10 purchases of 5 points and 10 redemptions of 10 points run concurrently
            let mut handles = Vec::new();
            for _ in 0..10 {
                let earn = domain.clone().oneshot(EarnPointsRequest {
                    member_id: member.member_id,
                    product_id: product.product_id,
                    quantity: 1,
                });
                handles.push(tokio::spawn(async move {
                    earn.await.map(|res| res.entry.delta_points)
                }));
                let redeem = domain.clone().oneshot(RedeemPointsRequest {
                    member_id: member.member_id,
                    points_to_redeem: 10,
                    purchase_amount: dec!(100),
                });
                handles.push(tokio::spawn(async move {
                    redeem.await.map(|res| res.entry.delta_points)
                }));
            }
            let mut applied = 0;
            for handle in handles {
                applied += handle.await??;
            }

            // THEN every delta is reflected in the final balance
            let stored = database.get_member(member.member_id).await?;
            let entries = database.list_entries(member.member_id).await?;
            assert_that!(applied).is_equal_to(-50);
            assert_that!(stored.loyalty_points).is_equal_to(50);
            assert_that!(entries).has_length(21);
            assert_reconciled(&database, member.member_id).await;
            Ok(())
        }

        if use_sqlite {
            let (domain, database) = sqlite_logic();
            run(domain, database).await
        } else {
            let (domain, database) = memory_logic();
            run(domain, database).await
        }
    }
}
