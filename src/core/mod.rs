//! Core module: Lock-Free MPMC Ring Buffer
//!
//! Prinsip desain:
//! - Lock-Free: Hanya atomic operations, tidak ada Mutex/RwLock
//! - No-Allocation: Semua slot pre-allocated saat init
//! - No-Blocking: Thread tidak pernah park; menunggu = spin + yield

mod backoff;
mod ring_buffer;

pub(crate) use backoff::Backoff;
pub use ring_buffer::{PutError, RingBuffer};
