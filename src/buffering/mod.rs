//! Double-buffer exchange between the capture and inference tasks.
//!
//! Two equal-length buffers alternate ownership: at any instant one is the
//! capture-side write target and the other is the inference-side read
//! source. `swap_and_signal` exchanges the roles as a unit and then wakes
//! the single waiting reader, so a released waiter always observes the
//! post-swap assignment.
//!
//! One mutex guards both buffers and is held only for the O(window) copy or
//! the pointer swap, which bounds the blocking contribution of this channel
//! to the real-time budget. The wake signal is raised after the lock is
//! released so the swap path stays safe to drive from interrupt context.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::sync::WakeSignal;

/// Builder for the paired exchange handles.
pub struct DoubleBuffer {
    len: usize,
}

impl DoubleBuffer {
    /// A channel exchanging windows of `len` samples.
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    /// Split into the capture-side and inference-side handles.
    pub fn split(self) -> (CaptureSide, InferenceSide) {
        let shared = Arc::new(Shared {
            buffers: Mutex::new(Buffers {
                capture: vec![0i16; self.len],
                inference: vec![0i16; self.len],
            }),
            data_ready: WakeSignal::new(),
            len: self.len,
        });
        (
            CaptureSide {
                shared: Arc::clone(&shared),
            },
            InferenceSide { shared },
        )
    }
}

struct Buffers {
    capture: Vec<i16>,
    inference: Vec<i16>,
}

struct Shared {
    buffers: Mutex<Buffers>,
    data_ready: WakeSignal,
    len: usize,
}

/// Producer half — held by the capture task.
pub struct CaptureSide {
    shared: Arc<Shared>,
}

impl CaptureSide {
    /// Copy `samples` into the capture-owned buffer.
    ///
    /// The lock is held only for the duration of the copy. Input longer than
    /// the window is truncated.
    pub fn write_from(&self, samples: &[i16]) {
        let mut bufs = self.shared.buffers.lock();
        let n = samples.len().min(self.shared.len);
        bufs.capture[..n].copy_from_slice(&samples[..n]);
    }

    /// Exchange buffer ownership, then wake the inference-side waiter.
    ///
    /// The signal is raised strictly after the swap completes: a reader
    /// released by `wait_for_data` never sees the pre-swap assignment.
    pub fn swap_and_signal(&self) {
        {
            let mut guard = self.shared.buffers.lock();
            let bufs = &mut *guard;
            std::mem::swap(&mut bufs.capture, &mut bufs.inference);
        }
        self.shared.data_ready.raise();
    }

    pub fn window_len(&self) -> usize {
        self.shared.len
    }
}

/// Consumer half — held by the inference task.
pub struct InferenceSide {
    shared: Arc<Shared>,
}

impl InferenceSide {
    /// Block until a swap has produced new data. Satisfied immediately if a
    /// swap already completed since the last wait.
    pub fn wait_for_data(&self) {
        self.shared.data_ready.wait();
    }

    /// Like `wait_for_data` with an upper bound, so the caller can
    /// periodically recheck its own termination conditions. Returns whether
    /// new data is available.
    pub fn wait_for_data_timeout(&self, timeout: std::time::Duration) -> bool {
        self.shared.data_ready.wait_timeout(timeout)
    }

    /// Copy the inference-owned buffer into caller-supplied storage, under
    /// the same short-held lock as the capture-side copy.
    pub fn read_into(&self, dst: &mut [i16]) {
        let bufs = self.shared.buffers.lock();
        let n = dst.len().min(self.shared.len);
        dst[..n].copy_from_slice(&bufs.inference[..n]);
    }

    pub fn window_len(&self) -> usize {
        self.shared.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn reader_sees_written_window_only_after_swap() {
        let (capture, inference) = DoubleBuffer::new(4).split();
        let mut out = vec![0i16; 4];

        capture.write_from(&[1, 2, 3, 4]);
        inference.read_into(&mut out);
        assert_eq!(out, vec![0, 0, 0, 0], "no swap yet — write must be invisible");

        capture.swap_and_signal();
        inference.wait_for_data();
        inference.read_into(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn write_after_swap_does_not_disturb_inference_side() {
        let (capture, inference) = DoubleBuffer::new(4).split();
        let mut out = vec![0i16; 4];

        capture.write_from(&[1, 2, 3, 4]);
        capture.swap_and_signal();
        // The capture side now owns the other buffer; writing into it must
        // not touch the window the inference side reads.
        capture.write_from(&[9, 9, 9, 9]);

        inference.wait_for_data();
        inference.read_into(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);

        capture.swap_and_signal();
        inference.wait_for_data();
        inference.read_into(&mut out);
        assert_eq!(out, vec![9, 9, 9, 9]);
    }

    #[test]
    fn released_waiter_observes_post_swap_assignment() {
        let (capture, inference) = DoubleBuffer::new(2).split();

        let reader = thread::spawn(move || {
            inference.wait_for_data();
            let mut out = vec![0i16; 2];
            inference.read_into(&mut out);
            out
        });

        thread::sleep(Duration::from_millis(20));
        capture.write_from(&[7, 8]);
        capture.swap_and_signal();

        assert_eq!(reader.join().expect("reader panicked"), vec![7, 8]);
    }

    #[test]
    fn wait_is_satisfied_immediately_after_prior_swap() {
        let (capture, inference) = DoubleBuffer::new(2).split();
        capture.write_from(&[5, 6]);
        capture.swap_and_signal();
        inference.wait_for_data(); // must not block
        let mut out = vec![0i16; 2];
        inference.read_into(&mut out);
        assert_eq!(out, vec![5, 6]);
    }
}
