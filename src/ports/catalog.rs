use uuid::Uuid;

use crate::domain::{Product, ProductChanges};

#[mockall::automock]
#[async_trait::async_trait]
pub trait CatalogPort {
    async fn get_product(&self, product_id: Uuid) -> Result<Product, Error>;
    async fn create_product(&self, product: Product) -> Result<Product, Error>;
    /// Catalog listing, most recently added first
    async fn list_products(&self) -> Result<Vec<Product>, Error>;
    /// Apply `changes` to a stored product and return the result
    async fn update_product(
        &self,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("product {0} does not exist")]
    ProductDoesNotExist(Uuid),

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
