pub mod truck;
pub mod truck_pool;
