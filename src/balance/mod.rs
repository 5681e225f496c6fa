pub mod cache;
pub mod store;

pub use cache::BalanceCache;
pub use store::{BalanceStore, InMemoryBalanceStore};
