//! Untyped input of the prover: the node graph, the symbols and source
//! locations it refers to, and the scope free symbols are resolved in.

pub mod anchor;
pub mod intern;
pub mod node;
pub mod scope;
