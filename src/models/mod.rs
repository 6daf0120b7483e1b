pub mod open_event;
pub mod region;

pub use open_event::{EventId, NewOpenEvent, OpenEvent};
pub use region::Region;
