//! Lock-Free Multi-Producer Multi-Consumer (MPMC) Ring Buffer
//!
//! Bounded queue berbasis array dengan dual sequence number per slot.
//! Tidak ada Mutex, tidak ada alokasi setelah inisialisasi.
//!
//! Koordinasi sepenuhnya lewat CAS pada dua cursor global plus handshake
//! `put_seq`/`get_seq` per slot. Thread yang kalah race tidak pernah
//! block: dia yield dan caller yang memutuskan retry.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use super::Backoff;

/// Kapasitas maksimum yang masih bisa dibulatkan ke power of 2 dalam u32.
const MAX_CAPACITY: u32 = 1 << 31;

/// Slot dalam ring buffer - payload plus dua sequence number penjaga.
///
/// `put_seq == pos && get_seq == pos` berarti slot siap ditulis untuk posisi
/// `pos`. Setelah menulis, producer memajukan `put_seq` sebesar `capacity`
/// (bukan 1) supaya lap sekarang bisa dibedakan dari lap sebelumnya tanpa
/// field epoch terpisah. Consumer melakukan hal yang sama pada `get_seq`
/// setelah membaca, dan itu yang mempersenjatai slot untuk lap berikutnya.
#[repr(C, align(64))] // Cache line alignment untuk menghindari false sharing antar slot
struct Slot<T> {
    put_seq: AtomicU32,
    get_seq: AtomicU32,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(seq: u32) -> Self {
        Self {
            put_seq: AtomicU32::new(seq),
            get_seq: AtomicU32::new(seq),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Put ditolak: queue penuh atau kalah CAS race dengan producer lain.
///
/// Dua kasus itu sengaja tidak dibedakan - dari sisi caller keduanya berarti
/// "coba lagi". Value dikembalikan ke caller, tidak ada yang hilang.
pub struct PutError<T> {
    /// Value yang ditolak, milik caller lagi.
    pub value: T,
    /// Snapshot occupancy saat penolakan (advisory, bisa langsung basi).
    pub occupied: u32,
}

impl<T> PutError<T> {
    /// Ambil kembali value yang ditolak.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("occupied", &self.occupied)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue full or contended (occupied: {})", self.occupied)
    }
}

/// Lock-Free MPMC Ring Buffer
///
/// Dua cursor global di cache line terpisah supaya sisi producer dan sisi
/// consumer tidak saling invalidate. Kapasitas dibulatkan ke power of 2
/// terdekat saat konstruksi dan tetap sampai buffer di-drop.
pub struct RingBuffer<T> {
    // Producer side - cache line aligned
    put_cursor: CacheLinePadded<AtomicU32>,
    // Consumer side - cache line aligned
    get_cursor: CacheLinePadded<AtomicU32>,
    // Pre-allocated slots di heap - tidak ada alokasi setelah init
    slots: Box<[Slot<T>]>,
    capacity: u32,
    // Mask untuk operasi modulo yang cepat (capacity selalu power of 2)
    mask: u32,
}

// SAFETY: RingBuffer aman untuk Send/Sync karena:
// - Reservasi posisi lewat CAS menjamin paling banyak satu thread per slot
// - Handshake put_seq/get_seq (Acquire/Release) menjamin visibility payload
// - Payload hanya disentuh oleh thread pemilik reservasi
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Membuat ring buffer baru.
    ///
    /// `requested` dibulatkan ke atas ke power of 2 terdekat (minimum 1).
    /// Alokasi hanya terjadi sekali di sini; setelah itu hot path bebas
    /// alokasi.
    ///
    /// # Panics
    /// Panic jika `requested > 2^31` (tidak bisa dibulatkan dalam u32).
    pub fn new(requested: u32) -> Self {
        assert!(
            requested <= MAX_CAPACITY,
            "requested capacity must be <= 2^31"
        );

        let capacity = round_up_pow2(requested);
        let mask = capacity - 1;

        // Slot i di-arm untuk posisi i, kecuali slot 0 yang di-bias penuh
        // satu capacity: reservasi dimulai dari cursor + 1, jadi posisi
        // pertama yang menulis slot 0 adalah posisi `capacity`.
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.push(Slot::new(capacity));
        for i in 1..capacity {
            slots.push(Slot::new(i));
        }

        Self {
            put_cursor: CacheLinePadded::new(AtomicU32::new(0)),
            get_cursor: CacheLinePadded::new(AtomicU32::new(0)),
            slots: slots.into_boxed_slice(),
            capacity,
            mask,
        }
    }

    /// Put satu item ke queue (sisi producer).
    ///
    /// `Ok(occupied)` jika diterima. `Err` jika queue penuh ATAU kalah CAS
    /// race - keduanya berarti "coba lagi" dan value dikembalikan lewat
    /// error. Satu attempt per panggilan; retry sepenuhnya urusan caller.
    #[inline(always)]
    pub fn put(&self, value: T) -> Result<u32, PutError<T>> {
        let get_pos = self.get_cursor.value.load(Ordering::Acquire);
        let put_pos = self.put_cursor.value.load(Ordering::Relaxed);
        let occupied = put_pos.wrapping_sub(get_pos);

        // Penuh. Snapshot get_pos yang basi hanya membuat occupied kelihatan
        // lebih besar (cursor monotonic), jadi arah salahnya konservatif.
        if occupied >= self.capacity {
            thread::yield_now();
            return Err(PutError { value, occupied });
        }

        let pos = put_pos.wrapping_add(1);
        // Ordering Relaxed cukup di sini: cursor hanya arbitrase reservasi,
        // visibility payload dibawa oleh handshake sequence per slot.
        if self
            .put_cursor
            .value
            .compare_exchange(put_pos, pos, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // Producer lain menang race. Dari sisi caller sama dengan penuh.
            thread::yield_now();
            return Err(PutError { value, occupied });
        }

        self.write_slot(pos, value);
        Ok(occupied.wrapping_add(1))
    }

    /// Put banyak item sekaligus dengan satu reservasi CAS.
    ///
    /// Item yang diterima di-drain dari depan `values`; sisanya tetap milik
    /// caller untuk disubmit ulang. Returns `(accepted, occupied)`.
    /// Penerimaan parsial adalah hasil normal, bukan error.
    pub fn put_batch(&self, values: &mut Vec<T>) -> (u32, u32) {
        let get_pos = self.get_cursor.value.load(Ordering::Acquire);
        let put_pos = self.put_cursor.value.load(Ordering::Relaxed);
        let occupied = put_pos.wrapping_sub(get_pos);

        if values.is_empty() {
            return (0, occupied);
        }

        if occupied >= self.capacity {
            thread::yield_now();
            return (0, occupied);
        }

        let free = self.capacity - occupied;
        let put_cnt = u32::try_from(values.len()).unwrap_or(u32::MAX).min(free);
        let pos_new = put_pos.wrapping_add(put_cnt);

        if self
            .put_cursor
            .value
            .compare_exchange(put_pos, pos_new, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
            return (0, occupied);
        }

        // Range posisi put_pos+1 ..= put_pos+put_cnt sudah milik kita.
        for (i, value) in values.drain(..put_cnt as usize).enumerate() {
            self.write_slot(put_pos.wrapping_add(1).wrapping_add(i as u32), value);
        }

        (put_cnt, occupied.wrapping_add(put_cnt))
    }

    /// Get satu item dari queue (sisi consumer).
    ///
    /// `(None, occupied)` jika queue kosong atau kalah CAS race. Item keluar
    /// dalam urutan penempatan (FIFO global): posisi `p` baru bisa dibaca
    /// setelah writer posisi `p` selesai publish.
    #[inline(always)]
    pub fn get(&self) -> (Option<T>, u32) {
        let put_pos = self.put_cursor.value.load(Ordering::Acquire);
        let get_pos = self.get_cursor.value.load(Ordering::Relaxed);
        let occupied = put_pos.wrapping_sub(get_pos);

        // occupied > capacity berarti snapshot tidak konsisten: put dibaca
        // sebelum get dan keduanya sempat maju di antara dua load. Tolak
        // konservatif - reservasi berdasarkan snapshot begitu bisa melewati
        // posisi yang belum pernah ditulis.
        if occupied < 1 || occupied > self.capacity {
            // Yield dulu; skenario terbaiknya producer sempat mengisi.
            thread::yield_now();
            return (None, occupied);
        }

        let pos = get_pos.wrapping_add(1);
        if self
            .get_cursor
            .value
            .compare_exchange(get_pos, pos, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
            return (None, occupied);
        }

        let value = self.read_slot(pos);
        (Some(value), occupied.wrapping_sub(1))
    }

    /// Get sampai `max` item sekaligus dengan satu reservasi CAS.
    ///
    /// Item di-append ke `out` supaya caller bisa reuse alokasinya.
    /// Returns `(got, occupied)`.
    pub fn get_batch(&self, out: &mut Vec<T>, max: u32) -> (u32, u32) {
        let put_pos = self.put_cursor.value.load(Ordering::Acquire);
        let get_pos = self.get_cursor.value.load(Ordering::Relaxed);
        let occupied = put_pos.wrapping_sub(get_pos);

        if max == 0 {
            return (0, occupied);
        }

        // Guard snapshot tidak konsisten, sama seperti get().
        if occupied < 1 || occupied > self.capacity {
            thread::yield_now();
            return (0, occupied);
        }

        let get_cnt = occupied.min(max);
        let pos_new = get_pos.wrapping_add(get_cnt);

        if self
            .get_cursor
            .value
            .compare_exchange(get_pos, pos_new, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
            return (0, occupied);
        }

        out.reserve(get_cnt as usize);
        for i in 0..get_cnt {
            out.push(self.read_slot(get_pos.wrapping_add(1).wrapping_add(i)));
        }

        (get_cnt, occupied.wrapping_sub(get_cnt))
    }

    /// Jumlah item yang belum dibaca. Advisory - bisa langsung basi karena
    /// producer/consumer jalan terus.
    ///
    /// put_cursor dibaca duluan supaya hasilnya tidak pernah melebihi
    /// capacity: get_cursor hanya bisa maju di antara dua load.
    #[inline(always)]
    pub fn occupied(&self) -> u32 {
        let put_pos = self.put_cursor.value.load(Ordering::Acquire);
        let get_pos = self.get_cursor.value.load(Ordering::Acquire);
        put_pos.wrapping_sub(get_pos)
    }

    /// Kapasitas aktual (power of 2 hasil pembulatan).
    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Cek apakah queue kosong (advisory)
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Cek apakah queue penuh (advisory)
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.occupied() >= self.capacity
    }

    /// Tunggu slot siap ditulis untuk posisi `pos`, tulis payload, publish.
    ///
    /// Pemanggil HARUS pemenang reservasi posisi `pos`. Loop ini hanya
    /// menunggu consumer lap sebelumnya selesai mengosongkan slot.
    #[inline]
    fn write_slot(&self, pos: u32, value: T) {
        let slot = &self.slots[(pos & self.mask) as usize];
        let mut backoff = Backoff::new();

        loop {
            let get_seq = slot.get_seq.load(Ordering::Acquire);
            let put_seq = slot.put_seq.load(Ordering::Acquire);

            // Siap ditulis: kedua sequence tepat di generasi posisi ini.
            if put_seq == pos && get_seq == pos {
                // SAFETY: reservasi CAS menjamin hanya kita yang memegang
                // posisi `pos`, dan load Acquire get_seq di atas sinkron
                // dengan Release store consumer lap sebelumnya - slot sudah
                // benar-benar kosong.
                unsafe {
                    (*slot.value.get()).write(value);
                }
                // Release store mem-publish payload ke consumer posisi `pos`.
                // Maju sebesar capacity, bukan 1: penanda "sudah ditulis
                // untuk lap ini".
                slot.put_seq
                    .store(pos.wrapping_add(self.capacity), Ordering::Release);
                return;
            }

            backoff.snooze();
        }
    }

    /// Tunggu slot siap dibaca untuk posisi `pos`, ambil payload, re-arm.
    #[inline]
    fn read_slot(&self, pos: u32) -> T {
        let slot = &self.slots[(pos & self.mask) as usize];
        let mut backoff = Backoff::new();

        loop {
            let get_seq = slot.get_seq.load(Ordering::Acquire);
            let put_seq = slot.put_seq.load(Ordering::Acquire);

            // Siap dibaca: writer posisi ini sudah publish (+capacity).
            if get_seq == pos && put_seq == pos.wrapping_add(self.capacity) {
                // SAFETY: load Acquire put_seq sinkron dengan Release store
                // writer, jadi payload lengkap dan ownership pindah ke kita.
                // Slot tidak menahan apa pun setelah ini.
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                // Re-arm slot untuk writer lap berikutnya.
                slot.get_seq
                    .store(pos.wrapping_add(self.capacity), Ordering::Release);
                return value;
            }

            backoff.snooze();
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // &mut self berarti tidak ada operasi lain yang sedang jalan, jadi
        // semua posisi sampai put_cursor sudah selesai ditulis dan posisi
        // get_pos+1 ..= put_pos berisi item yang belum dibaca siapa pun.
        let get_pos = self.get_cursor.value.load(Ordering::Relaxed);
        let put_pos = self.put_cursor.value.load(Ordering::Relaxed);
        let occupied = put_pos.wrapping_sub(get_pos);

        for i in 0..occupied {
            let pos = get_pos.wrapping_add(1).wrapping_add(i);
            let slot = &self.slots[(pos & self.mask) as usize];
            // SAFETY: item pada posisi ini ditulis lengkap dan tidak pernah
            // dibaca, jadi masih initialized dan milik buffer.
            unsafe {
                (*slot.value.get()).assume_init_drop();
            }
        }
    }
}

impl<T> fmt::Display for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let get_pos = self.get_cursor.value.load(Ordering::Acquire);
        let put_pos = self.put_cursor.value.load(Ordering::Acquire);
        write!(
            f,
            "RingBuffer{{capacity: {}, mask: {}, put_cursor: {}, get_cursor: {}}}",
            self.capacity, self.mask, put_pos, get_pos
        )
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("mask", &self.mask)
            .field("occupied", &self.occupied())
            .finish_non_exhaustive()
    }
}

/// Pembulatan ke power of 2 terkecil yang >= `v` (minimum 1).
///
/// Bit smear klasik: decrement, OR-shift 1/2/4/8/16, increment.
/// Domain caller sudah dijaga <= 2^31 jadi increment tidak overflow.
fn round_up_pow2(v: u32) -> u32 {
    if v <= 1 {
        return 1;
    }
    let mut v = v - 1;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v + 1
}
