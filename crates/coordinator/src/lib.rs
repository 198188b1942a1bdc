pub mod base;
pub mod bus_checker;

pub use base::BaseCoordinator;
pub use bus_checker::BusHealthChecker;
