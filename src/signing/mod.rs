mod wallet;

pub use wallet::Wallet;
