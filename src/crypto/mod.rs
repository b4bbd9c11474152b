pub mod cipher;

pub use self::cipher::{EncryptedSecret, SecretCipher};
