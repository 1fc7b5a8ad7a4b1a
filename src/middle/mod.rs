//! Types are inferred here and the untyped node graph is specialized into
//! typed IR, one function per distinct instantiation of each template.

pub mod ir;
pub mod prover;
pub mod qualifier;
pub mod ty;
