pub mod open_order;
pub mod product;
pub mod stock_movement;
pub mod transaction;
pub mod transaction_item;
pub mod user;
