//! Structure-preserving stacking of per-frame batches into time-major data.
//!
//! A rollout records one batch per frame: `Vec<T>` with one element per
//! environment instance. [`Stack::stack`] turns `T` such frames into a
//! single time-major aggregate. Leaf types stack into a [`Column`]
//! (`[time, batch]`); composite types stack field by field, so a struct
//! of leaves becomes a struct of columns with the same shape.
//!
//! ```
//! use lagstep_core::{project_frames, Column, Stack, StackError};
//!
//! #[derive(Clone)]
//! struct Pad { x: f32, pressed: bool }
//!
//! struct StackedPad { x: Column<f32>, pressed: Column<bool> }
//!
//! impl Stack for Pad {
//!     type Stacked = StackedPad;
//!     fn stack(frames: &[Vec<Self>]) -> Result<StackedPad, StackError> {
//!         Ok(StackedPad {
//!             x: f32::stack(&project_frames(frames, |p| p.x))?,
//!             pressed: bool::stack(&project_frames(frames, |p| p.pressed))?,
//!         })
//!     }
//! }
//!
//! let frames = vec![vec![Pad { x: 0.5, pressed: false }], vec![Pad { x: 1.0, pressed: true }]];
//! let stacked = Pad::stack(&frames).unwrap();
//! assert_eq!(stacked.x.shape(), (2, 1));
//! assert_eq!(stacked.pressed.get(1, 0), Some(&true));
//! ```

use crate::error::StackError;

/// A flat time-major buffer with shape `[time, batch]`.
///
/// Row `t` holds the batch recorded at frame `t`.
#[derive(Clone, Debug, PartialEq)]
pub struct Column<T> {
    data: Vec<T>,
    time: usize,
    batch: usize,
}

impl<T> Column<T> {
    /// Build a column from flat row-major data.
    pub fn from_parts(data: Vec<T>, time: usize, batch: usize) -> Result<Self, StackError> {
        let expected = time * batch;
        if data.len() != expected {
            return Err(StackError::ShapeMismatch {
                expected,
                found: data.len(),
            });
        }
        Ok(Self { data, time, batch })
    }

    /// Number of frames.
    pub fn time_len(&self) -> usize {
        self.time
    }

    /// Number of environment instances per frame.
    pub fn batch_len(&self) -> usize {
        self.batch
    }

    /// `(time, batch)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.time, self.batch)
    }

    /// The batch recorded at frame `t`.
    pub fn row(&self, t: usize) -> Option<&[T]> {
        if t >= self.time {
            return None;
        }
        let start = t * self.batch;
        Some(&self.data[start..start + self.batch])
    }

    /// The element for instance `b` at frame `t`.
    pub fn get(&self, t: usize, b: usize) -> Option<&T> {
        if b >= self.batch {
            return None;
        }
        self.row(t).map(|row| &row[b])
    }

    /// Iterate over frames in time order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        (0..self.time).filter_map(move |t| self.row(t))
    }

    /// The flat row-major data.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consume the column, returning its flat data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone> Column<T> {
    /// Stack per-frame batches along a new leading time axis.
    ///
    /// Every frame must have the batch width of frame 0.
    pub fn from_frames(frames: &[Vec<T>]) -> Result<Self, StackError> {
        let batch = frames.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(frames.len() * batch);
        for (time_index, frame) in frames.iter().enumerate() {
            if frame.len() != batch {
                return Err(StackError::RaggedBatch {
                    time_index,
                    expected: batch,
                    found: frame.len(),
                });
            }
            data.extend_from_slice(frame);
        }
        Ok(Self {
            data,
            time: frames.len(),
            batch,
        })
    }
}

/// Types whose per-frame batches can be stacked into a time-major aggregate.
pub trait Stack: Sized {
    /// The time-major aggregate produced by [`stack`](Stack::stack).
    type Stacked;

    /// Stack `frames` (time-major, one `Vec` of instances per frame).
    fn stack(frames: &[Vec<Self>]) -> Result<Self::Stacked, StackError>;
}

/// Map every element of every frame, keeping the `[time][batch]` layout.
///
/// This is the building block for field-by-field [`Stack`] impls.
pub fn project_frames<T, U>(frames: &[Vec<T>], f: impl Fn(&T) -> U) -> Vec<Vec<U>> {
    frames
        .iter()
        .map(|frame| frame.iter().map(&f).collect())
        .collect()
}

macro_rules! impl_stack_leaf {
    ($($t:ty),* $(,)?) => {
        $(
            impl Stack for $t {
                type Stacked = Column<$t>;

                fn stack(frames: &[Vec<Self>]) -> Result<Column<$t>, StackError> {
                    Column::from_frames(frames)
                }
            }
        )*
    };
}

impl_stack_leaf!(f32, f64, i8, i16, i32, i64, u8, u16, u32, u64, usize, bool, ());

impl<A: Stack + Clone, B: Stack + Clone> Stack for (A, B) {
    type Stacked = (A::Stacked, B::Stacked);

    fn stack(frames: &[Vec<Self>]) -> Result<Self::Stacked, StackError> {
        Ok((
            A::stack(&project_frames(frames, |(a, _)| a.clone()))?,
            B::stack(&project_frames(frames, |(_, b)| b.clone()))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_frames_is_time_major() {
        let frames = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let col = Column::from_frames(&frames).unwrap();
        assert_eq!(col.shape(), (2, 3));
        assert_eq!(col.row(0), Some(&[1, 2, 3][..]));
        assert_eq!(col.row(1), Some(&[4, 5, 6][..]));
        assert_eq!(col.get(1, 0), Some(&4));
        assert_eq!(col.row(2), None);
        assert_eq!(col.get(0, 3), None);
    }

    #[test]
    fn ragged_frames_are_rejected() {
        let frames = vec![vec![1.0f32, 2.0], vec![3.0]];
        assert_eq!(
            Column::from_frames(&frames),
            Err(StackError::RaggedBatch {
                time_index: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn empty_frames_stack_to_empty_column() {
        let col = u8::stack(&[]).unwrap();
        assert_eq!(col.shape(), (0, 0));
        assert_eq!(col.rows().count(), 0);
    }

    #[test]
    fn from_parts_checks_shape() {
        assert!(Column::from_parts(vec![0u8; 6], 2, 3).is_ok());
        assert_eq!(
            Column::from_parts(vec![0u8; 5], 2, 3),
            Err(StackError::ShapeMismatch {
                expected: 6,
                found: 5
            })
        );
    }

    #[test]
    fn tuples_stack_field_by_field() {
        let frames = vec![vec![(1u32, true)], vec![(2u32, false)]];
        let (ids, flags) = <(u32, bool)>::stack(&frames).unwrap();
        assert_eq!(ids.as_slice(), &[1, 2]);
        assert_eq!(flags.as_slice(), &[true, false]);
    }

    proptest! {
        #[test]
        fn rows_reproduce_frames(
            batch in 0usize..6,
            time in 0usize..12,
            seed in any::<i64>(),
        ) {
            let frames: Vec<Vec<i64>> = (0..time)
                .map(|t| (0..batch).map(|b| seed.wrapping_add((t * 31 + b) as i64)).collect())
                .collect();
            let col = i64::stack(&frames).unwrap();
            prop_assert_eq!(col.time_len(), time);
            for (t, frame) in frames.iter().enumerate() {
                prop_assert_eq!(col.row(t).unwrap(), frame.as_slice());
            }
        }
    }
}
