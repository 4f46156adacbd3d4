//! The Dynamic Source Routing protocol logic, free of any I/O.

mod router;

pub use router::{DsrRouter, Outcome, RouterState};
