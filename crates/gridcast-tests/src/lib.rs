//! Integration test crate for gridcast.
//!
//! This crate exists solely to hold cross-crate tests. Every scenario runs
//! a real engine against synthetic sources, with ticks driven by the test
//! so timing is deterministic.

#[cfg(test)]
mod support;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod transport;

#[cfg(test)]
mod observers;

#[cfg(test)]
mod failures;
