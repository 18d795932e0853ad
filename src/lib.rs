// Drivebase motion core and its zenoh runtime

pub mod config;
pub mod drivebase;
pub mod follower;
pub mod geometry;
pub mod hw;
pub mod messages;
pub mod motion;
pub mod path;
pub mod runtime;
