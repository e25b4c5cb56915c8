//! Order store - Persists orders together with their line items and pool allocations.
//!
//! [`create_order`] issues several inserts; callers that need them to land as
//! one unit (the fulfillment orchestrator always does) pass a
//! `DatabaseTransaction` as the connection.

use crate::{
    core::allocator::Allocation,
    entities::{
        Order, OrderAllocation, OrderItem, OrderStatus, order, order_allocation, order_item,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use tracing::{info, instrument};

/// A validated line of an order request, before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    /// Menu item being ordered
    pub menu_item_id: i64,
    /// Units requested, at least one
    pub quantity: i64,
    /// Credit price per unit at order time
    pub unit_price: i64,
}

impl OrderLine {
    /// Credits this line costs.
    #[must_use]
    pub const fn credits(&self) -> i64 {
        self.quantity * self.unit_price
    }
}

/// An order with everything stored alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    /// Order header
    pub order: order::Model,
    /// Line items, in menu item order
    pub items: Vec<order_item::Model>,
    /// Pools that paid for the order, in debit order
    pub allocations: Vec<order_allocation::Model>,
}

/// Inserts an order header, its line items and the allocation that paid for it.
///
/// # Errors
/// * `EmptySelection` if `lines` is empty
/// * `InvalidAmount` if the allocation does not cover exactly the credits the lines cost
/// * `Database` if any insert fails
#[instrument(skip(db, lines, allocation), fields(lines = lines.len()))]
pub async fn create_order<C>(
    db: &C,
    owner: &str,
    status: OrderStatus,
    lines: &[OrderLine],
    allocation: &Allocation,
) -> Result<OrderDetails>
where
    C: ConnectionTrait,
{
    if lines.is_empty() {
        return Err(Error::EmptySelection);
    }
    let requested_credits: i64 = lines.iter().map(OrderLine::credits).sum();
    if allocation.total() != requested_credits {
        return Err(Error::InvalidAmount {
            amount: allocation.total(),
        });
    }

    let order = order::ActiveModel {
        owner: Set(owner.to_string()),
        requested_credits: Set(requested_credits),
        status: Set(status),
        placed_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = order_item::ActiveModel {
            order_id: Set(order.id),
            menu_item_id: Set(line.menu_item_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            ..Default::default()
        }
        .insert(db)
        .await?;
        items.push(item);
    }

    let mut allocations = Vec::with_capacity(allocation.debits().len());
    for debit in allocation.debits() {
        let row = order_allocation::ActiveModel {
            order_id: Set(order.id),
            pool_id: Set(debit.pool_id),
            credits: Set(debit.credits),
            ..Default::default()
        }
        .insert(db)
        .await?;
        allocations.push(row);
    }

    info!(
        "Created order {} for owner {}: credits={}, items={}, pools={}",
        order.id,
        owner,
        requested_credits,
        items.len(),
        allocations.len()
    );
    Ok(OrderDetails {
        order,
        items,
        allocations,
    })
}

/// Loads an order with its items and allocations.
///
/// # Errors
/// `OrderNotFound` if there is no order with this ID.
pub async fn get_order_details<C>(db: &C, order_id: i64) -> Result<OrderDetails>
where
    C: ConnectionTrait,
{
    let order = Order::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or(Error::OrderNotFound { order_id })?;

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await?;

    let allocations = OrderAllocation::find()
        .filter(order_allocation::Column::OrderId.eq(order_id))
        .order_by_asc(order_allocation::Column::Id)
        .all(db)
        .await?;

    Ok(OrderDetails {
        order,
        items,
        allocations,
    })
}

/// All orders placed by `owner`, newest first.
pub async fn list_orders<C>(db: &C, owner: &str) -> Result<Vec<order::Model>>
where
    C: ConnectionTrait,
{
    Order::find()
        .filter(order::Column::Owner.eq(owner))
        .order_by_desc(order::Column::PlacedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::allocator::allocate;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn line(menu_item_id: i64, quantity: i64) -> OrderLine {
        OrderLine {
            menu_item_id,
            quantity,
            unit_price: 1,
        }
    }

    #[tokio::test]
    async fn test_create_order_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_order(&db, "alice", OrderStatus::Pending, &[], &Allocation::default()).await;
        assert!(matches!(result.unwrap_err(), Error::EmptySelection));

        // Allocation covering nothing cannot pay for a two-credit order
        let result = create_order(
            &db,
            "alice",
            OrderStatus::Pending,
            &[line(1, 2)],
            &Allocation::default(),
        )
        .await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 0 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_load_order_integration() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;
        let allocation = allocate(&db, "alice", 5).await?;

        let created = create_order(
            &db,
            "alice",
            OrderStatus::Confirmed,
            &[line(7, 2), line(9, 3)],
            &allocation,
        )
        .await?;

        assert_eq!(created.order.owner, "alice");
        assert_eq!(created.order.requested_credits, 5);
        assert_eq!(created.order.status, OrderStatus::Confirmed);
        assert_eq!(created.items.len(), 2);
        assert_eq!(created.items[1].menu_item_id, 9);
        assert_eq!(created.items[1].quantity, 3);
        assert_eq!(created.allocations.len(), 1);
        assert_eq!(created.allocations[0].pool_id, pool.id);
        assert_eq!(created.allocations[0].credits, 5);

        let loaded = get_order_details(&db, created.order.id).await?;
        assert_eq!(loaded, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_order_details_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            get_order_details(&db, 42).await.unwrap_err(),
            Error::OrderNotFound { order_id: 42 }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_per_owner() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_pool(&db, "alice", 10).await?;
        create_test_pool(&db, "bob", 10).await?;

        let mut ids = Vec::new();
        for quantity in [1, 2] {
            let allocation = allocate(&db, "alice", quantity).await?;
            let details = create_order(
                &db,
                "alice",
                OrderStatus::Pending,
                &[line(1, quantity)],
                &allocation,
            )
            .await?;
            ids.push(details.order.id);
        }
        let allocation = allocate(&db, "bob", 1).await?;
        create_order(&db, "bob", OrderStatus::Pending, &[line(1, 1)], &allocation).await?;

        let orders = list_orders(&db, "alice").await?;
        let listed: Vec<i64> = orders.iter().map(|o| o.id).collect();
        assert_eq!(listed, vec![ids[1], ids[0]]);
        Ok(())
    }
}
