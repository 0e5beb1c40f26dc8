pub mod audit_log;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod user;
pub mod wishlist_item;

pub use audit_log::Entity as AuditLog;
pub use cart_item::Entity as CartItem;
pub use category::Entity as Category;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use product::Entity as Product;
pub use user::Entity as User;
pub use wishlist_item::Entity as WishlistItem;
