pub mod integration;
pub mod user;

pub use self::integration::IntegrationProducer;
pub use self::user::UserProducer;
