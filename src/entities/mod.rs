//! Entity module - Contains all SeaORM entity definitions for the ledger tables.
//! Each entity has a Model struct for data and an Entity struct for operations.
//! This is the only layer that knows how rows are stored; everything above it
//! works with the typed models.

pub mod credit_pool;
pub mod order;
pub mod order_allocation;
pub mod order_item;

// Re-export specific types to avoid conflicts
pub use credit_pool::{Column as CreditPoolColumn, Entity as CreditPool, Model as CreditPoolModel};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel, OrderStatus};
pub use order_allocation::{
    Column as OrderAllocationColumn, Entity as OrderAllocation, Model as OrderAllocationModel,
};
pub use order_item::{Column as OrderItemColumn, Entity as OrderItem, Model as OrderItemModel};
