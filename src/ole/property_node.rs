//! Interval-with-payload node, the unit every plex and run table is built from.
//!
//! A node covers the half-open interval `[start, end)` and owns its payload.
//! Run tables keep their nodes sorted by `start`; edits shift and clip the
//! intervals in place and may leave zero-length nodes behind, which readers
//! skip.

use crate::common::error::{Error, Result};
use bytes::Bytes;

/// A property node: `[start, end)` plus an owned payload.
///
/// Based on Apache POI's PropertyNode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNode<T> {
    start: u32,
    end: u32,
    payload: T,
}

/// A node whose payload is an opaque fixed-size struct, as stored in a plex.
pub type GenericPropertyNode = PropertyNode<Bytes>;

impl<T> PropertyNode<T> {
    /// Create a node, rejecting inverted intervals.
    pub fn new(start: u32, end: u32, payload: T) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            payload,
        })
    }

    /// Create a zero-length node at `cp`.
    #[inline]
    pub fn empty_at(cp: u32, payload: T) -> Self {
        Self {
            start: cp,
            end: cp,
            payload,
        }
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub fn set_start(&mut self, start: u32) {
        self.start = start;
    }

    #[inline]
    pub fn set_end(&mut self, end: u32) {
        self.end = end;
    }

    /// Length of the interval; zero for dead nodes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `pos` falls inside `[start, end)`.
    #[inline]
    pub fn contains(&self, pos: u32) -> bool {
        self.start <= pos && pos < self.end
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Move the whole interval right by `length`.
    #[inline]
    pub fn shift_right(&mut self, length: u32) {
        self.start += length;
        self.end += length;
    }

    /// Move the whole interval left by `length`.
    #[inline]
    pub fn shift_left(&mut self, length: u32) {
        self.start -= length;
        self.end -= length;
    }

    /// Apply the deletion of `[offset, offset + length)` to this node alone.
    ///
    /// Nodes after the deletion move left, nodes overlapping it are clipped,
    /// nodes before it are untouched.
    pub fn adjust_for_delete(&mut self, offset: u32, length: u32) {
        let end_mark = offset + length;
        if self.end <= offset {
            return;
        }
        if self.start < end_mark {
            self.end = if end_mark >= self.end {
                offset
            } else {
                self.end - length
            };
            self.start = self.start.min(offset);
        } else {
            self.shift_left(length);
        }
    }
}
