//! Coffee-shop loyalty points
//!
//! Members earn one point per 50 currency units spent and redeem points one-for-one against a
//! purchase. Every balance change goes through a single ledger unit that updates the balance
//! and appends the matching ledger entry atomically, so a member's balance always equals the
//! sum of their ledger deltas.
//!
//! Operations are [`tower::Service`]s on [`commands::DomainLogic`], which talks to storage only
//! through the traits in [`ports`].

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
