pub mod dispatcher;
pub mod store;

pub use dispatcher::Dispatcher;
pub use store::LocalStore;
