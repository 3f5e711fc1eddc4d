//! Reference point-region tree.
//!
//! An arena-allocated 2^DIM-ary tree over an axis-aligned bounding box,
//! splitting leaves that exceed a point capacity. Implements the [`Tree`]
//! contract the FMM solver is written against, including the near/far dual
//! traversal. On a single process every node is `Local`; the distributed
//! bookkeeping (sharing, migration) belongs to a multi-rank tree and is not
//! reimplemented here.
//!
//! [`Tree`]: multipole_traits::tree::Tree

mod near_far;
#[cfg(feature = "mpi")]
pub mod parallel;
mod prtree;

pub use prtree::PrTree;
