// Optimistic send lifecycle for a simulated chat, plus the pieces the
// terminal front-end needs from it
pub mod lifecycle;
pub mod models;
pub mod settings;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use lifecycle::{ChatEvent, LocalId, OptimisticChat};
pub use models::*;
pub use settings::Settings;
pub use transport::{RemoteSend, SendError, SimulatedTransport};
