use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;

pub mod open_orders;
pub mod products;
pub mod reports;
pub mod stock;
pub mod transactions;

pub use open_orders::OpenOrderService;
pub use products::ProductService;
pub use reports::ReportService;
pub use stock::StockService;
pub use transactions::TransactionService;

/// Container wiring every service to the shared pool and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub products: ProductService,
    pub transactions: TransactionService,
    pub stock: StockService,
    pub reports: ReportService,
    pub open_orders: OpenOrderService,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            products: ProductService::new(db_pool.clone(), event_sender.clone()),
            transactions: TransactionService::new(db_pool.clone(), event_sender.clone()),
            stock: StockService::new(db_pool.clone(), event_sender.clone()),
            reports: ReportService::new(db_pool.clone()),
            open_orders: OpenOrderService::new(db_pool, event_sender),
        }
    }
}
