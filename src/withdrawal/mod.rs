pub mod engine;
pub mod session;

pub use self::engine::{
    ConfirmOutcome, StepOutcome, WithdrawalEngine, WithdrawalReceipt, NATIVE_DECIMALS,
    NATIVE_SYMBOL,
};
pub use self::session::{SessionStore, WithdrawalSession, WithdrawalState};
