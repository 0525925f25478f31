pub mod hub;
pub mod messages;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod trucks;
pub mod util;
pub mod test_util;
