//! Error taxonomy for the retargeting pipeline.
//!
//! Only the fatal conditions are errors; everything else (missing joints,
//! unmapped ancestors, absent texture channels) is logged and skipped so a
//! partial retarget of a large asset still produces usable output.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RigError {
    /// The donor scene has no root child to graft into the target.
    #[error("donor scene has no root child to graft")]
    MissingDonorRoot,

    /// A joint's world transform is not invertible, so its inverse bind
    /// matrix cannot be computed without producing NaNs.
    #[error("joint '{joint}' has a degenerate (non-invertible) world transform")]
    DegenerateTransform { joint: String },
}
