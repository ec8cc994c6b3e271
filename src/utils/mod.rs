//! Utility helpers: handle storage, math extensions, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;
pub mod slim_bag;

pub use allocator::{Arena, Handle};
pub use math::*;
pub use profiling::StepProfile;
pub use slim_bag::SlimBag;
