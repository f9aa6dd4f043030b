//! Administrative operations for members and the product catalog
//!
//! These never touch balances: a new member starts at zero points and only the ledger can
//! change that afterwards.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{Member, Product, ProductChanges},
    ports::{catalog::CatalogPort, ledger::LedgerPort, member::MemberPort},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower::Service;
use tracing::info;
use uuid::Uuid;

use super::{DomainLogic, Error};

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GetMemberRequest {
    pub member_id: Uuid,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListMembersRequest {}

#[derive(Clone, Debug, Deserialize)]
pub struct GetProductRequest {
    pub product_id: Uuid,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListProductsRequest {}

/// Edit of a catalog entry
///
/// Missing or blank fields keep their stored value.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub product_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

/// Trimmed value of a required text field
fn required(field: &'static str, value: &str) -> Result<String, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} is required").into()));
    }
    Ok(value.to_string())
}

fn validate_price(price: Decimal) -> Result<(), Error> {
    if price < Decimal::ZERO {
        return Err(Error::InvalidInput("price must be non-negative".into()));
    }
    Ok(())
}

/// Blank optional fields are stored as absent
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl<L, M, C> Service<RegisterMemberRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Member;
    type Error = Error;
    type Future = BoxFuture<Member>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RegisterMemberRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move {
            let name = required("name", &req.name)?;
            let email = required("email", &req.email)?;
            let stored = member
                .create_member(Member::new(name, email, optional(req.phone)))
                .await?;
            info!(member_id = %stored.member_id, "Member registered");
            Ok(stored)
        })
    }
}

impl<L, M, C> Service<GetMemberRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Member;
    type Error = Error;
    type Future = BoxFuture<Member>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetMemberRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move { Ok(member.get_member(req.member_id).await?) })
    }
}

impl<L, M, C> Service<AddProductRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Product;
    type Error = Error;
    type Future = BoxFuture<Product>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AddProductRequest) -> Self::Future {
        let catalog = self.catalog.clone();
        Box::pin(async move {
            let name = required("name", &req.name)?;
            validate_price(req.price)?;
            let stored = catalog
                .create_product(Product::new(
                    name,
                    optional(req.description),
                    req.price,
                    optional(req.category),
                ))
                .await?;
            info!(product_id = %stored.product_id, price = %stored.price, "Product added");
            Ok(stored)
        })
    }
}

impl<L, M, C> Service<ListMembersRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Vec<Member>;
    type Error = Error;
    type Future = BoxFuture<Vec<Member>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ListMembersRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move { Ok(member.list_members().await?) })
    }
}

impl<L, M, C> Service<GetProductRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Product;
    type Error = Error;
    type Future = BoxFuture<Product>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetProductRequest) -> Self::Future {
        let catalog = self.catalog.clone();
        Box::pin(async move { Ok(catalog.get_product(req.product_id).await?) })
    }
}

impl<L, M, C> Service<ListProductsRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Vec<Product>;
    type Error = Error;
    type Future = BoxFuture<Vec<Product>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ListProductsRequest) -> Self::Future {
        let catalog = self.catalog.clone();
        Box::pin(async move { Ok(catalog.list_products().await?) })
    }
}

impl<L, M, C> Service<UpdateProductRequest> for DomainLogic<L, M, C>
where
    L: LedgerPort + Send + Sync + 'static,
    M: MemberPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    type Response = Product;
    type Error = Error;
    type Future = BoxFuture<Product>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UpdateProductRequest) -> Self::Future {
        let catalog = self.catalog.clone();
        Box::pin(async move {
            if let Some(price) = req.price {
                validate_price(price)?;
            }
            let changes = ProductChanges {
                name: optional(req.name),
                description: optional(req.description),
                price: req.price,
                category: optional(req.category),
            };
            let updated = catalog.update_product(req.product_id, changes).await?;
            info!(product_id = %updated.product_id, price = %updated.price, "Product updated");
            Ok(updated)
        })
    }
}
