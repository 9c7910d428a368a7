pub mod engine;
pub mod health;
pub mod state;

pub use engine::{InboxEngine, Subscription};
pub use health::{HealthMonitor, HealthProbe, HealthState};
pub use state::InboxState;
