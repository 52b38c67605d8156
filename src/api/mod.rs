pub mod gateway;
pub mod paper;

pub use gateway::BrokerGateway;
pub use paper::{BrokerCall, PaperBroker};
