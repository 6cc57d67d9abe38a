//! Signal fusion and risk guardrails for FX order intents.
//!
//! Ten analysis engines score each (pair, timeframe) cycle; fusion folds
//! them into one decision under layered weights; a fixed gate sequence and a
//! house-money sizer decide whether and how large that decision trades.

pub mod account;
pub mod config;
pub mod decision;
pub mod engines;
pub mod fuse;
pub mod guard;
pub mod logging;
pub mod pipeline;
pub mod shadow;
pub mod signal;
pub mod sizing;
pub mod storage;
pub mod weights;
