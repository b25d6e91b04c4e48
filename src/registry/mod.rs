pub mod erc8004;

pub use erc8004::RegistryClient;
