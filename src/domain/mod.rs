pub mod access;
pub mod models;
pub mod progress;
pub mod scoring;
pub mod submission;
pub mod survey_window;
