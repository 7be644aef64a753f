//! SCGI front end: query string in, XML out

pub mod activity;
pub mod operation;
pub mod server;
pub mod tls;
pub mod xml;

pub use activity::ScgiActivity;
pub use operation::{parse_request, Operation, Operations};
pub use server::{RwHandler, ScgiServer, TcpServer};
pub use tls::load_acceptor;
pub use xml::responses_to_xml;
