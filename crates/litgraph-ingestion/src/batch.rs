//! Fixed-size batching of fallible record streams.

/// Default number of records per store call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Groups an iterator of `Result<T, E>` into `Vec<T>` batches of at most
/// `batch_size` items, preserving order.
///
/// An upstream error is yielded as soon as it is reached; items already
/// buffered for the interrupted batch are dropped and iteration ends.
pub struct BatchIterator<I> {
    source: I,
    batch_size: usize,
    done: bool,
}

impl<I> BatchIterator<I> {
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            done: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Access the wrapped iterator, e.g. to read extractor statistics.
    pub fn get_ref(&self) -> &I {
        &self.source
    }
}

impl<T, E, I> Iterator for BatchIterator<I>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.source.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// `.batched(n)` on any fallible iterator.
pub trait Batched: Iterator + Sized {
    fn batched(self, batch_size: usize) -> BatchIterator<Self> {
        BatchIterator::new(self, batch_size)
    }
}

impl<T, E, I> Batched for I where I: Iterator<Item = Result<T, E>> {}
