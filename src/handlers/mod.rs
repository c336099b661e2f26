pub mod common;
pub mod open_orders;
pub mod products;
pub mod reports;
pub mod stock;
pub mod transactions;

pub use open_orders::open_order_routes;
pub use products::product_routes;
pub use reports::report_routes;
pub use stock::stock_routes;
pub use transactions::transaction_routes;
