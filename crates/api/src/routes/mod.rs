mod health;
mod signals;
mod ws;

pub use health::health_router;
pub use signals::signals_router;
pub use ws::ws_router;
