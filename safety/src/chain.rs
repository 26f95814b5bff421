//! Interlock chain plumbing.
//!
//! Each action family declares an ordered list of steps. A step is a
//! predicate plus effect evaluated against the request's mediator; it
//! returns an explicit verdict and the fold short-circuits at the first
//! `Stop`. The terminal conversion then builds the response from
//! whatever the mediator accumulated.

/// Verdict of one chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}
