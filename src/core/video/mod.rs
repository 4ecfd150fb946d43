//! Frame-side plumbing: raster frames, frame sources, dense motion and the
//! scrolling-text tracker built on top of it.

pub mod flow_field;
pub mod flow_tracker;
pub mod frame;
pub mod source;

pub use flow_field::{
    DisplacementEstimator, DisplacementField, FlowParams, PyramidalFlow, ZeroDisplacement,
};
pub use flow_tracker::{FlowConfig, FlowTracker, MotionBuffer, TrackedText};
pub use frame::{Frame, PixelFormat};
pub use source::{FrameSource, VecFrameSource};
