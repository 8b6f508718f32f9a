//! Change detection and push delivery: per-connection polling sessions that
//! baseline a sheet's row count, re-fetch on a fixed interval, and stream the
//! delta of newly appended rows to the owning client connection.

pub mod messages;
pub mod registry;
pub mod session;
pub mod traits;

pub use messages::{Inbound, Outbound};
pub use registry::{SessionRegistry, StartError};
pub use session::SessionStatus;
pub use traits::Broadcaster;
