//! Host-side link to the comfort sensor board
//!
//! Everything that touches the wire lives here: the byte-stream transport,
//! the line codec, the connection state machine with its background read
//! loop, change-only notification gating, feedback persistence, and the
//! supervisor that turns sensor frames into ensemble decisions.
//!
//! The inference side (predictors, retraining, voting) lives in the
//! `coordination` crate; this crate only moves frames and events between it
//! and the board.

pub mod codec;
pub mod dedup;
pub mod feedback_log;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use codec::{Frame, ProtocolCodec, SensorFrame};
pub use session::{ConnectionState, LinkBus, LinkConfig, LinkEvent, LinkSession, SharedLinkBus};
pub use supervisor::SessionSupervisor;
pub use transport::{LinkConnector, TcpConnector, TransportPair};
