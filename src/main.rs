use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use retail_orders::config::AppConfig;
use retail_orders::domain::catalog::{CatalogStore, InMemoryCatalog, PgCatalogStore, Product};
use retail_orders::domain::order::{
    Caller, LineItem, OrderAmounts, OrderCommandHandler, OrderEvent, PaymentReference,
    ShippingAddress,
};
use retail_orders::event_sourcing::InMemoryEventStore;
use retail_orders::infrastructure::ConsistencyLedger;
use retail_orders::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=retail_orders=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,retail_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting retail order lifecycle demo");

    let config = AppConfig::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let metrics_registry = Arc::new(metrics.registry().clone());
    let (host, port) = (config.metrics_host, config.metrics_port);
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, host, port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Catalog ===
    let keyboard = Product::new("Mechanical Keyboard", Decimal::new(8999, 2), 5);
    let catalog: Arc<dyn CatalogStore> = match &config.database_url {
        Some(url) => {
            let store = PgCatalogStore::connect(url).await?;
            store.ensure_schema().await?;
            store.insert(&keyboard).await?;
            Arc::new(store)
        }
        None => {
            tracing::info!("No database configured, using the in-memory catalog");
            let store = InMemoryCatalog::new();
            store.insert(keyboard.clone()).await;
            Arc::new(store)
        }
    };

    // === 3. Order lifecycle ===
    let ledger = Arc::new(ConsistencyLedger::new());
    let handler = OrderCommandHandler::new(
        Arc::new(InMemoryEventStore::<OrderEvent>::new("Order")),
        catalog.clone(),
        ledger.clone(),
        metrics.clone(),
    )
    .with_conflict_retries(config.conflict_retries);

    let customer = Caller::user(Uuid::new_v4());
    let admin = Caller::admin(Uuid::new_v4());
    let line_items = vec![LineItem {
        product_id: keyboard.id,
        name: keyboard.name.clone(),
        quantity: 2,
        unit_price: keyboard.price,
        image_ref: None,
    }];
    let amounts = OrderAmounts {
        items_total: keyboard.price * Decimal::from(2),
        tax: Decimal::new(2700, 2),
        shipping: Decimal::ZERO,
        grand_total: keyboard.price * Decimal::from(2) + Decimal::new(2700, 2),
    };
    let address = ShippingAddress {
        name: "Ada Lovelace".to_string(),
        phone: "+44 20 7946 0000".to_string(),
        street: "12 St James's Square".to_string(),
        city: "London".to_string(),
        state: "Greater London".to_string(),
        zip_code: "SW1Y 4LB".to_string(),
        country: "United Kingdom".to_string(),
    };

    let stock = |label: &'static str| {
        let catalog = catalog.clone();
        let product_id = keyboard.id;
        async move {
            let stock = catalog
                .find_product(product_id)
                .await?
                .map(|p| p.stock)
                .unwrap_or_default();
            tracing::info!(product_id = %product_id, stock = stock, "📦 Stock {}", label);
            anyhow::Ok(stock)
        }
    };

    // Scenario A: pending order, direct cancel
    tracing::info!("📝 Scenario A: cancel a pending order");
    let order = handler
        .create_order(customer.user_id, line_items.clone(), address.clone(), amounts.clone())
        .await?;
    stock("after order placed").await?;
    let outcome = handler.request_cancel(order.id, customer.user_id, None).await?;
    tracing::info!(order_id = %order.id, status = %outcome.order.status, "✅ {}", outcome.message);
    stock("after direct cancel").await?;

    // Scenario B: paid order, cancel approved by an admin
    tracing::info!("📝 Scenario B: cancel a paid order with admin approval");
    let order = handler
        .create_order(customer.user_id, line_items.clone(), address.clone(), amounts.clone())
        .await?;
    handler.mark_paid(order.id, demo_payment(order.id)).await?;
    let outcome = handler
        .request_cancel(order.id, customer.user_id, Some("Ordered the wrong layout".to_string()))
        .await?;
    tracing::info!(order_id = %order.id, status = %outcome.order.status, "✅ {}", outcome.message);
    stock("while cancel request is pending").await?;
    let approved = handler.approve_cancel_request(&admin, order.id).await?;
    tracing::info!(order_id = %order.id, status = %approved.status, "✅ Cancel request approved");
    stock("after approval").await?;

    // Scenario C: paid order, cancel rejected by an admin
    tracing::info!("📝 Scenario C: reject a cancel request");
    let order = handler
        .create_order(customer.user_id, line_items, address, amounts)
        .await?;
    handler.mark_paid(order.id, demo_payment(order.id)).await?;
    handler.request_cancel(order.id, customer.user_id, None).await?;
    let rejected = handler.reject_cancel_request(&admin, order.id).await?;
    tracing::info!(
        order_id = %order.id,
        status = %rejected.status,
        cancel_reason = ?rejected.cancel_reason,
        "✅ Cancel request rejected"
    );
    stock("after rejection").await?;

    let orders = handler.list_all_orders(&admin).await?;
    tracing::info!("📋 {} orders on record", orders.len());

    let stats = ledger.stats().await;
    if stats.total_records > 0 {
        tracing::error!(
            "⚠️ {} stock adjustments need manual repair: {:?}",
            stats.total_records,
            stats.by_operation
        );
    }

    tracing::info!("🎉 Demo complete!");

    Ok(())
}

fn demo_payment(order_id: Uuid) -> PaymentReference {
    PaymentReference {
        id: format!("pi_sim_{}", order_id.simple()),
        status: "succeeded".to_string(),
        update_time: chrono::Utc::now().to_rfc3339(),
        email_address: Some("ada@example.com".to_string()),
    }
}
