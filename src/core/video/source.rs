use std::collections::VecDeque;

use super::frame::Frame;
use crate::core::error::ConsolidationError;

/// Ordered, finite stream of decoded frames for one session.
///
/// `open` failing aborts the session. A `next_frame` error only loses that
/// frame; the consolidator logs it and moves on.
pub trait FrameSource {
    fn open(&mut self) -> Result<(), ConsolidationError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Result<Frame, ConsolidationError>>;
}

/// In-memory source, mostly for tests and for callers that decode up front.
pub struct VecFrameSource {
    frames: VecDeque<Result<Frame, ConsolidationError>>,
    fail_open: Option<String>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            fail_open: None,
        }
    }

    /// Source that interleaves decode failures with frames.
    pub fn with_results(frames: Vec<Result<Frame, ConsolidationError>>) -> Self {
        Self {
            frames: frames.into(),
            fail_open: None,
        }
    }

    /// Source whose `open` fails with the given reason.
    pub fn unopenable(reason: &str) -> Self {
        Self {
            frames: VecDeque::new(),
            fail_open: Some(reason.to_string()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn open(&mut self) -> Result<(), ConsolidationError> {
        match &self.fail_open {
            Some(reason) => Err(ConsolidationError::SourceOpen(reason.clone())),
            None => Ok(()),
        }
    }

    fn next_frame(&mut self) -> Option<Result<Frame, ConsolidationError>> {
        self.frames.pop_front()
    }
}
