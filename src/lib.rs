#![no_std]
#![doc = include_str!("../README.md")]

//! Concurrency building blocks.
//!
//! This crate provides two intrusive lock-free structures that link
//! caller-owned [`Node`]s without allocating:
//!
//! * [`AtomicStack`], a LIFO stack, and
//! * [`AtomicQueue`], a FIFO queue sharing the same node type.
//!
//! It also provides [`ByteRing`], a ring of variable-length byte records in a
//! caller-supplied buffer. With the `std` feature (on by default) there is
//! also [`BlockingByteRing`], which shares a `ByteRing` between threads and
//! blocks writers while it is full and readers while it is empty.

#[cfg(any(test, feature = "std"))]
extern crate std;

mod anchor;
#[cfg(feature = "std")]
mod blocking;
mod node;
mod queue;
mod ring;
mod stack;
mod sync;


#[cfg(feature = "std")]
pub use blocking::{BlockingByteRing, WriteSlot};
pub use node::Node;
pub use queue::AtomicQueue;
pub use ring::{ByteRing, Full, HEADER_LEN, ReadError};
pub use stack::{AtomicStack, Drain};
