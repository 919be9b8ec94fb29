pub mod item;
pub mod order;
pub mod payment;
pub mod user;
pub mod validation;

pub use item::*;
pub use order::*;
pub use payment::*;
pub use user::*;
pub use validation::*;
