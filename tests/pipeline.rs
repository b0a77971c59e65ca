//! End-to-end tests for the dispatch pipeline.
//!
//! Test organization:
//! - harness.rs: shared in-memory gateway wiring
//! - admission.rs: admit endpoint behavior under load and duplication
//! - end_to_end.rs: full request lifecycles against stubbed providers

#[path = "pipeline/admission.rs"]
mod admission;
#[path = "pipeline/end_to_end.rs"]
mod end_to_end;
#[path = "pipeline/harness.rs"]
mod harness;
