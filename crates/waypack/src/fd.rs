use std::collections::VecDeque;
use std::os::fd::OwnedFd;

/// FIFO of descriptors received alongside the byte stream.
///
/// Messages claim descriptors strictly in arrival order, one per `fd`
/// argument. Dropping the queue closes anything left unclaimed.
#[derive(Debug, Default)]
pub struct FdQueue {
    fds: VecDeque<OwnedFd>,
}

impl FdQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fd: OwnedFd) {
        self.fds.push_back(fd);
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Takes the oldest descriptor.
    pub fn claim(&mut self) -> Option<OwnedFd> {
        self.fds.pop_front()
    }

    /// Closes every queued descriptor.
    pub fn clear(&mut self) {
        self.fds.clear();
    }
}

impl Extend<OwnedFd> for FdQueue {
    fn extend<I: IntoIterator<Item = OwnedFd>>(&mut self, iter: I) {
        self.fds.extend(iter);
    }
}
