pub mod rest;
pub mod stream;

pub use rest::AlpacaHistory;
pub use stream::AlpacaStream;
