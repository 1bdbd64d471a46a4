//! Builders for the resources composed by the engine.
//!
//! Like all builders in this crate they only assemble descriptors. Deciding
//! what goes into them is up to [`crate::synthesis`].
pub mod release;
pub mod secret;
