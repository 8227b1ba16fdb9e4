//! Child output forwarding and readiness detection.

mod classifier;

pub use classifier::{OutputClassifier, OutputSource, ReadinessLatch, MAX_CHUNK};
