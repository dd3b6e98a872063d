pub mod user_created;

pub use self::user_created::UserCreatedConsumer;
