//! Middle tier of the compiler: specializes the untyped node graph handed
//! over by the macro expander into typed IR, inferring types and tracking
//! ownership of unique resources along the way.

pub mod frontend;
pub mod index;
pub mod middle;
pub mod session;

pub use middle::prover::{ProveError, ProveErrorKind, Result};
pub use session::{ProverConfig, Session};
