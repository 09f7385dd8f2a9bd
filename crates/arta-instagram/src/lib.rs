//! Instagram platform boundary: transport client, session persistence, and
//! the connection-resilience supervisor.
//!
//! The transport turns the platform's HTTP and realtime interfaces into a
//! channel of [`LinkEvent`]s; the supervisor owns login, session reuse,
//! disconnect detection, and exponential-backoff reconnection up to a bounded
//! attempt ceiling.

mod events;
mod resilience;
mod session_store;
mod supervisor;
mod transport;

pub use events::{Credentials, InboundComment, InboundMessage, LinkEvent};
pub use resilience::{ConnectionMonitor, LinkStatus, ReconnectDirective, ReconnectPolicy};
pub use session_store::SessionStore;
pub use supervisor::ConnectionSupervisor;
pub use transport::{
    InstagramApiClient, InstagramApiConfig, OutboundSender, PlatformTransport, TransportError,
};
