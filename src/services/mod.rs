pub mod audit;
pub mod cart;
pub mod catalog;
pub mod dashboard;
pub mod orders;
pub mod payments;
pub mod users;
pub mod wishlist;
