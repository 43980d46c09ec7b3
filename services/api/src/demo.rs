use crate::infra::{recipients, seed_catalog, RecordingMailer};
use clap::Args;
use order_desk::config::MarketplaceConfig;
use order_desk::error::AppError;
use order_desk::marketplace::{
    spawn_dispatch_worker, CreateOrderRequest, ListOrdersRequest, MemoryMarketplace,
    NotificationQueue, Order, OrderEngine, OrderError, Principal, ServiceRef, UserId,
    VerificationStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Catalog service the demo client orders
    #[arg(long, default_value = "GST Registration")]
    pub(crate) service: String,
    /// Quoted price for the first order
    #[arg(long, default_value = "1499.00")]
    pub(crate) price: Decimal,
    /// Skip printing the notification outbox at the end
    #[arg(long)]
    pub(crate) skip_outbox: bool,
}

type Engine = OrderEngine<MemoryMarketplace>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        service,
        price,
        skip_outbox,
    } = args;

    let store = Arc::new(MemoryMarketplace::new());
    seed_catalog(&store)?;
    store.add_provider(
        &UserId::from("partner-asha"),
        "Asha Kulkarni",
        VerificationStatus::Verified,
    )?;
    store.add_provider(
        &UserId::from("partner-ravi"),
        "Ravi Menon",
        VerificationStatus::Verified,
    )?;
    store.add_provider(
        &UserId::from("partner-meera"),
        "Meera Iyer",
        VerificationStatus::Pending,
    )?;

    let (notifications, notices) = NotificationQueue::channel();
    let mailer = Arc::new(RecordingMailer::default());
    let worker = spawn_dispatch_worker(notices, mailer.clone());
    let engine = OrderEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        notifications,
        MarketplaceConfig::default(),
    );

    let client = Principal::Client {
        user_id: UserId::from("client-priya"),
        name: Some("Priya Shah".to_string()),
        email: Some("priya@example.com".to_string()),
    };
    let asha = Principal::partner("partner-asha");
    let ravi = Principal::partner("partner-ravi");
    let meera = Principal::partner("partner-meera");
    let admin = Principal::admin("admin-ops");

    println!("Order desk demo");

    println!("\n1. Client places an order for '{service}'");
    let order = engine.create_order(
        &client,
        CreateOrderRequest {
            service: ServiceRef::Name(service),
            remarks: Some("Need the certificate before quarter close".to_string()),
        },
    )?;
    print_order(&order);

    println!("\n2. Admin quotes {price}, checkout starts, payment settles");
    engine.quote_order(&admin, &order.id, price)?;
    engine.mark_payment_pending(&order.id)?;
    let order = engine.mark_payment_completed(&order.id)?;
    print_order(&order);

    println!("\n3. Marketplace visibility");
    let market = engine.list_orders(&asha, available())?;
    println!("- verified partner sees {} available order(s)", market.total);
    report_rejection("pending partner", engine.list_orders(&meera, available()));

    println!("\n4. Two verified partners race for the job");
    let claimed = engine.claim_order(&asha, &order.id)?;
    println!(
        "- partner-asha claimed {} (provider {})",
        claimed.id,
        claimed
            .provider_id
            .as_ref()
            .map_or("none", |provider| provider.as_str())
    );
    report_rejection("partner-ravi", engine.claim_order(&ravi, &order.id));

    println!("\n5. Assigned partner completes the work");
    let completed = engine.complete_order(&asha, &order.id)?;
    print_order(&completed);

    println!("\n6. A second paid order is cancelled by an admin and refunded");
    let second = run_refund_flow(&engine, &client, &ravi, &admin)?;
    print_order(&second);
    report_rejection("late claim", engine.claim_order(&asha, &second.id));

    println!("\n7. A brand-new client has nothing to list yet");
    let empty = engine.list_orders(
        &Principal::client("client-new"),
        ListOrdersRequest {
            status: None,
            page: 1,
            limit: 10,
            available_only: false,
        },
    )?;
    println!("- {} order(s), {} page(s)", empty.total, empty.total_pages);

    drop(engine);
    if worker.await.is_err() {
        println!("\nnotification worker stopped unexpectedly");
    }

    if !skip_outbox {
        println!("\nNotification outbox");
        for (audience, subject) in mailer.outbox() {
            println!("- to {}: {subject}", recipients(audience));
        }
    }

    Ok(())
}

fn run_refund_flow(
    engine: &Engine,
    client: &Principal,
    partner: &Principal,
    admin: &Principal,
) -> Result<Order, OrderError> {
    let order = engine.create_order(
        client,
        CreateOrderRequest {
            service: ServiceRef::Name("Partnership Registration".to_string()),
            remarks: None,
        },
    )?;
    engine.mark_payment_completed(&order.id)?;
    engine.claim_order(partner, &order.id)?;
    engine.cancel_order(admin, &order.id)?;
    engine.refund_order(admin, &order.id)
}

fn available() -> ListOrdersRequest {
    ListOrdersRequest {
        status: None,
        page: 1,
        limit: 10,
        available_only: true,
    }
}

fn print_order(order: &Order) {
    let price = order
        .final_price
        .map_or_else(|| "unquoted".to_string(), |price| price.to_string());
    println!(
        "- {} | status {} | payment {} | price {} | updated {}",
        order.id,
        order.status,
        order.payment_status,
        price,
        order.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn report_rejection<T>(actor: &str, outcome: Result<T, OrderError>) {
    match outcome {
        Ok(_) => println!("- {actor}: unexpectedly allowed"),
        Err(err) => println!("- {actor}: rejected ({}) {err}", err.kind()),
    }
}
