pub mod user;

pub use self::user::{
    InMemoryUserStore, NewUser, ServiceContext, StaticDirectory, User, UserCreated, UserDirectory,
    UserService, UserStore, UserSynced,
};
