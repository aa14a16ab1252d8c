//! Kilat - Lock-Free Bounded MPMC Ring Queue
//!
//! Queue terbatas berbasis array untuk banyak producer dan banyak consumer
//! sekaligus, tanpa lock sama sekali:
//! - Lock-Free: Koordinasi hanya lewat CAS cursor + sequence handshake per slot
//! - No-Allocation: Semua slot pre-allocated saat init, hot path bebas alokasi
//! - Bounded: Kapasitas tetap (power of 2), backpressure eksplisit ke caller
//! - Batch API: Reservasi range dengan satu CAS untuk amortisasi atomic ops
//!
//! Operasi tidak pernah block dan tidak pernah gagal fatal: put/get yang
//! kalah race atau menemukan queue penuh/kosong mengembalikan indikasi
//! "coba lagi" dan menyerahkan kebijakan retry ke caller.

pub mod core;

pub use crate::core::{PutError, RingBuffer};
