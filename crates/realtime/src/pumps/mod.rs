//! Per-connection pump tasks: read dispatch, ordered writes, keepalive.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
