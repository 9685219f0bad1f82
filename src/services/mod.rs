pub mod catalog;
pub mod enrollment;
pub mod fixtures;
pub mod stats;

pub use catalog::{CourseOrder, CourseQuery, LearningPath};
pub use enrollment::EnrollmentService;
pub use fixtures::{Fixture, FixtureError, ImportStats};
pub use stats::Statistics;
