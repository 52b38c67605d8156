// Paper trading against a synthetic market
pub mod session;
pub mod synthetic;

pub use session::{AccountSummary, PaperSession, SessionSettings};
pub use synthetic::SyntheticMarket;
