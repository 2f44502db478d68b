//! Single-producer single-consumer byte pipes between interrupt handlers and
//! tasks.

use core::{
    cell::{RefCell, UnsafeCell},
    future::{poll_fn, Future},
    mem::MaybeUninit,
    sync::atomic::{
        AtomicBool, AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
    task::{
        Poll::{Pending, Ready},
        Waker,
    },
};

use critical_section::Mutex;

// Push at HEAD, pop at TAIL
pub struct Ringbuf<T, const N: usize> {
    is_split: AtomicBool,
    /// Called after every successful write, e.g. to pend the interrupt that
    /// drains this buffer into a peripheral.
    notify: Option<fn()>,
    head: AtomicUsize,
    tail: AtomicUsize,
    consumer_waker: Mutex<RefCell<Option<Waker>>>,
    buf: [UnsafeCell<MaybeUninit<T>>; N],
}

// SAFETY: Slots are only touched by the single Producer (between head and
// the end of free space) or the single Consumer (between tail and head), and
// the indices are published with Release/Acquire ordering.
unsafe impl<T: Send, const N: usize> Sync for Ringbuf<T, N> {}

impl<T, const N: usize> Default for Ringbuf<T, N> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T, const N: usize> Ringbuf<T, N> {
    pub const fn new(notify: Option<fn()>) -> Self {
        Self {
            is_split: AtomicBool::new(false),
            notify,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            consumer_waker: Mutex::new(RefCell::new(None)),
            // SAFETY: This array only contains MaybeUninits, which are sound to
            // have hold an uninit value
            #[allow(clippy::uninit_assumed_init)]
            buf: unsafe { MaybeUninit::uninit().assume_init() },
        }
    }

    /// ## Safety
    /// Must only be called once, as only one Producer and Consumer may
    /// exist per Ringbuf.
    pub unsafe fn split(&'static self) -> (Producer<T, N>, Consumer<T, N>) {
        self.is_split.store(true, Relaxed);
        (Producer(self), Consumer(self))
    }

    pub fn try_split(&'static self) -> Option<(Producer<T, N>, Consumer<T, N>)> {
        if self.is_split.fetch_or(true, Relaxed) {
            None
        } else {
            // SAFETY: We have just checked to ensure that this Ringbuf has not
            // been split.
            Some(unsafe { self.split() })
        }
    }

    fn len(&self) -> usize {
        self.head
            .load(Acquire)
            .wrapping_sub(self.tail.load(Acquire))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() == N
    }

    fn wake(waker: &Mutex<RefCell<Option<Waker>>>) -> bool {
        match critical_section::with(|cs| waker.borrow_ref_mut(cs).take()) {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        }
    }

    fn register(waker: &Mutex<RefCell<Option<Waker>>>, new: &Waker) {
        critical_section::with(|cs| *waker.borrow_ref_mut(cs) = Some(new.clone()));
    }
}

pub struct Consumer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Consumer<T, N> {
    pub fn try_read(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            // First read the value out of the cell
            // SAFETY: The buffer is not empty, and could not have become empty since
            // we checked it because only one Consumer may exist.
            let val = unsafe {
                self.0.buf[self.0.tail.load(Acquire) % N]
                    .get()
                    .read()
                    .assume_init()
            };
            // Then increment the tail pointer
            self.0.tail.fetch_add(1, Release);

            Some(val)
        }
    }

    /// Reads until `buf` is full or the pipe is empty.
    pub fn read_available(&self, buf: &mut [T]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.try_read() {
                Some(val) => *slot = val,
                None => break,
            }
            count += 1;
        }
        count
    }

    pub fn async_read(&self) -> impl Future<Output = T> + '_ {
        poll_fn(|ctx| match self.try_read() {
            None => {
                Ringbuf::<T, N>::register(&self.0.consumer_waker, ctx.waker());
                Pending
            }
            Some(val) => Ready(val),
        })
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Producer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Producer<T, N> {
    pub fn try_write(&self, val: T) -> Result<(), T> {
        if self.is_full() {
            Err(val)
        } else {
            // First write the value into the empty cell
            // SAFETY: The buffer is not full, and could not have become full since
            // we checked it because only one Producer may exist.
            unsafe {
                (*self.0.buf[self.0.head.load(Acquire) % N].get()).write(val);
            }
            // Then increment the head index
            self.0.head.fetch_add(1, Release);

            if Ringbuf::<T, N>::wake(&self.0.consumer_waker) {
                log_trace!("woke up Consumer from Producer");
            }
            if let Some(notify) = self.0.notify {
                notify();
            }
            Ok(())
        }
    }

    pub fn try_write_iter(
        &self,
        iter: &mut impl Iterator<Item = T>,
        leftover: Option<T>,
    ) -> (Result<(), T>, usize) {
        if let Some(val) = leftover {
            if let Err(val) = self.try_write(val) {
                return (Err(val), 0);
            }
        }
        let mut count = 0_usize; // can't enumerate cause we don't own the iterator
        for val in iter {
            if let Err(val) = self.try_write(val) {
                return (Err(val), count);
            }
            count += 1;
        }
        (Ok(()), count)
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Free slots left.
    pub fn capacity_left(&self) -> usize {
        N - self.0.len()
    }
}

impl<const N: usize> Producer<u8, N> {
    /// Queues all of `bytes`, or none of them if they don't fit.
    pub fn try_write_all(&self, bytes: &[u8]) -> Result<(), usize> {
        if bytes.len() > self.capacity_left() {
            return Err(self.capacity_left());
        }
        let (result, _) = self.try_write_iter(&mut bytes.iter().copied(), None);
        result.map_err(|_| self.capacity_left())
    }
}
