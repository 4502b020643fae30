pub mod health;
pub use self::health::health;

pub mod dispatch;
pub use self::dispatch::dispatch;
