//! Core flows for barakah.
//!
//! Every collaborator (document store, identity provider, email, bank API,
//! secure storage, audit log, clock) is passed in at construction so the
//! flows can run against real backends or test doubles.

pub mod classify;
pub mod clock;
pub mod code;
pub mod countdown;
pub mod link;
pub mod otp;
pub mod register;
pub mod reset;
pub mod secure_storage;
pub mod sweep;
pub mod sync;
pub mod upstream;
pub mod validate;

pub use classify::classify;
pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::ResendCountdown;
pub use link::{BankLink, LinkError, LinkState, LinkedBankAccount};
pub use otp::{
    LockStatus, OtpEngine, OtpError, OtpPolicy, SentCode, VerificationError, VerificationOutcome,
};
pub use register::{
    Registered, Registration, RegistrationError, SignInChallenge, SignInConfirmation,
};
pub use reset::{PasswordResetFlow, ResetCodeOutcome, ResetError};
pub use secure_storage::{MemorySecureStorage, SecureStorage, SecureStorageError};
pub use sweep::{SweepPolicy, SweepReport, Sweeper};
pub use sync::{SyncError, TransactionSync};
pub use upstream::UpstreamError;
