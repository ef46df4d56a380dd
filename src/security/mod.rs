//! Header protection.
//!
//! Handlers may rewrite almost anything about a request or response, but some
//! headers belong to the edge itself. `read_only` names them per stage and
//! rejects handler results that change them.

pub mod read_only;

pub use read_only::{
    HeaderPolicy, PolicyError, ReadOnlySet, ALWAYS_READ_ONLY, ORIGIN_REQUEST_READ_ONLY,
    VIEWER_REQUEST_READ_ONLY,
};
