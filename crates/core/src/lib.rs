//! Domain model for the quiz session engine: questions, answers, grading,
//! settings and the report handed to collaborators at completion.

pub mod grading;
pub mod model;
pub mod time;

pub use time::Clock;
