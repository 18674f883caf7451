pub mod inventory_item;
pub mod stock_reservation;
