pub mod countdown;
pub mod metrics;
pub mod model;
pub mod ordering;
pub mod ports;
pub mod view;

pub use countdown::*;
pub use metrics::*;
pub use model::*;
pub use ordering::*;
pub use ports::*;
