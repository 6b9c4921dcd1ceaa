pub(crate) mod app_config;
pub(crate) mod exams;
pub(crate) mod results;
pub(crate) mod teachers;
