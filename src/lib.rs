pub mod app;
pub mod pack;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod sync;
pub mod trivia;

pub type AppResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
