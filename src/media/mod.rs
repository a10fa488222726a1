//! Media processing: C5 audio extraction/muxing subprocess helpers and
//! C8 censor operator.

pub mod censor;
pub mod ffmpeg;

pub use censor::{CensorMode, CensorOperator, CensoringPlan};
pub use ffmpeg::{CancelToken, FfmpegTool, MediaError};
