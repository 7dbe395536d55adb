pub mod delay;
pub mod logger;
pub mod mocks;
pub mod system;
