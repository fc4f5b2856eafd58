//! CLI command implementations, one module per concern (§4.5 Control API
//! surface plus the `serve` entrypoint), mirroring the teacher's
//! per-command submodule layout.

pub mod client;
pub mod serve;
