pub mod stock;
pub mod report;
pub mod request;
pub mod response;

pub use stock::*;
pub use report::*;
pub use request::*;
pub use response::*;
