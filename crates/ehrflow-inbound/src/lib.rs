//! Inbound protocol handling for the transfer counterpart's messages:
//! extract requests, continue messages and acknowledgements, plus the
//! top-level handler that classifies and routes them.

pub mod ack;
pub mod envelope;
pub mod handler;
pub mod request;
pub mod xml;

pub use ack::AckHandler;
pub use envelope::InboundMessage;
pub use handler::{InboundDisposition, InboundHandler};
pub use request::ExtractRequestHandler;
pub use xml::XmlCursor;
