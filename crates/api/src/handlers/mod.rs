pub mod georectify;
pub mod jobs;
pub mod projects;
pub mod recovery;
