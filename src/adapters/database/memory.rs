use super::ErasedPoisonError;
use crate::{
    domain::{LedgerEntry, LedgerRecord, Member, Product, ProductChanges},
    ports::{
        catalog::{self, CatalogPort},
        ledger::{self, apply_delta, Committed, LedgerPort, LedgerUnit},
        member::{self, MemberPort},
    },
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};
use tracing::debug;
use uuid::Uuid;

/// In-process store for members, products and the ledger
///
/// Every member row sits behind its own lock, so ledger units for different members run
/// concurrently while units for the same member are serialized.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    members: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Member>>>>>,
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl MemoryDatabase {
    fn member_row(
        &self,
        member_id: Uuid,
    ) -> Result<Option<Arc<Mutex<Member>>>, ErasedPoisonError> {
        Ok(self.members.read()?.get(&member_id).cloned())
    }
}

#[async_trait::async_trait]
impl MemberPort for MemoryDatabase {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, member::Error> {
        let row = self
            .member_row(member_id)?
            .ok_or(member::Error::MemberDoesNotExist(member_id))?;
        let member = row.lock()?.clone();
        Ok(member)
    }

    async fn create_member(&self, member: Member) -> Result<Member, member::Error> {
        let mut members = self.members.write()?;
        for row in members.values() {
            if row.lock()?.email == member.email {
                return Err(member::Error::EmailTaken(member.email));
            }
        }
        members.insert(member.member_id, Arc::new(Mutex::new(member.clone())));
        debug!(member_id = %member.member_id, "Stored member");

        Ok(member)
    }

    async fn list_members(&self) -> Result<Vec<Member>, member::Error> {
        let mut members = self
            .members
            .read()?
            .values()
            .map(|row| -> Result<Member, ErasedPoisonError> { Ok(row.lock()?.clone()) })
            .collect::<Result<Vec<_>, _>>()?;
        members.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(members)
    }
}

#[async_trait::async_trait]
impl CatalogPort for MemoryDatabase {
    async fn get_product(&self, product_id: Uuid) -> Result<Product, catalog::Error> {
        self.products
            .read()?
            .get(&product_id)
            .cloned()
            .ok_or(catalog::Error::ProductDoesNotExist(product_id))
    }

    async fn create_product(&self, product: Product) -> Result<Product, catalog::Error> {
        self.products
            .write()?
            .insert(product.product_id, product.clone());
        debug!(product_id = %product.product_id, "Stored product");

        Ok(product)
    }

    async fn list_products(&self) -> Result<Vec<Product>, catalog::Error> {
        let mut products: Vec<_> = self.products.read()?.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(products)
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, catalog::Error> {
        let mut products = self.products.write()?;
        let product = products
            .get_mut(&product_id)
            .ok_or(catalog::Error::ProductDoesNotExist(product_id))?;
        changes.apply(product);
        debug!(product_id = %product_id, "Updated product");

        Ok(product.clone())
    }
}

#[async_trait::async_trait]
impl LedgerPort for MemoryDatabase {
    async fn run_atomic(
        &self,
        member_id: Uuid,
        unit: LedgerUnit,
    ) -> Result<Committed, ledger::Error> {
        let row = self
            .member_row(member_id)?
            .ok_or(ledger::Error::MemberDoesNotExist(member_id))?;
        // Held until the entry is appended and the balance written
        let mut member = row.lock()?;

        let draft = unit(&*member)?;
        let previous_balance = member.loyalty_points;
        let new_balance = apply_delta(previous_balance, draft.delta_points)?;
        let entry = LedgerEntry::from_draft(member_id, draft);

        // Nothing is visible before this point, and neither step below can fail
        let mut entries = self.entries.lock()?;
        entries.push(entry.clone());
        member.loyalty_points = new_balance;
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
    }

    async fn list_entries(&self, member_id: Uuid) -> Result<Vec<LedgerRecord>, ledger::Error> {
        if self.member_row(member_id)?.is_none() {
            return Err(ledger::Error::MemberDoesNotExist(member_id));
        }

        let products = self.products.read()?;
        let records = self
            .entries
            .lock()?
            .iter()
            .rev()
            .filter(|entry| entry.member_id == member_id)
            .map(|entry| {
                let product = entry.product_id.and_then(|id| products.get(&id));
                LedgerRecord {
                    entry: entry.clone(),
                    product_name: product.map(|product| product.name.clone()),
                    product_price: product.map(|product| product.price),
                }
            })
            .collect();

        Ok(records)
    }
}
