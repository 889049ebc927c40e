pub mod sink;
pub mod turn;

pub use sink::UpdateSink;
pub use turn::{PreparedTurn, TurnOrchestrator};
