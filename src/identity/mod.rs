pub mod provision;
pub mod wallet;

pub use wallet::Wallet;
