pub mod simulation;

pub use simulation::ServerConfig;
