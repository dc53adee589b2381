// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod cipher;
pub mod ftp_history;
pub mod peloton;
pub mod refresh;
pub mod runner;
pub mod stack_sync;

pub use cipher::{CipherError, TokenCipher};
pub use ftp_history::FtpHistoryWalker;
pub use peloton::{PelotonApi, PelotonClient};
pub use refresh::{CredentialRefresher, RefreshOutcome};
pub use runner::ScheduledRunner;
pub use stack_sync::{RetryPolicy, StackSynchronizer, SyncLocks, SyncService};
