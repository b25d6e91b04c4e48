pub mod client;
pub mod credits;
pub mod inference;
pub mod x402;

pub use client::ConwayClient;
pub use credits::CreditBalance;
pub use inference::InferenceClient;
