pub mod traits;

pub use self::traits::ChainClient;
