//! Ports - traits at every external seam of the pipeline.

pub mod clock;
pub mod encoder;
pub mod poster;
pub mod prober;
pub mod segmenter;
pub mod status;
