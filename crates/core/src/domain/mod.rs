pub mod cart;
pub mod location;
pub mod product;
pub mod session;
