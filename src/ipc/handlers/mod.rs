pub mod accounts;
pub mod backup;
pub mod blog;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod grades;
pub mod quizzes;
pub mod shop;
pub mod uploads;
