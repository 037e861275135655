//! warden-engine: drives multi-party approval workflows against a verifier.
//!
//! The [`WardenSession`] is the entry point. It composes the operation
//! registry from `warden-core`, a [`Verifier`] and [`Network`] for chain
//! access, a [`Signer`], a `warden-storage` transaction store and a
//! [`Clock`]. The [`MetaTxBuilder`] turns an operation into a signed
//! payload; the [`Dispatcher`] gets it on-chain.

pub mod builder;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod static_verifier;
pub mod verifier;

pub use builder::{
    MetaTxBuilder, MetaTxSubject, NewOperation, SignOutcome, SigningOptions, SigningScheme,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{WardenConfig, CONFIG_ENV};
pub use dispatcher::{DispatchOutcome, DispatchReceipt, Dispatcher};
pub use error::WardenError;
pub use rpc::RpcNetwork;
pub use session::{PendingOperation, SessionBuilder, SignedPayload, WardenSession};
pub use signer::{LocalSigner, Signer};
pub use static_verifier::{ConfirmationMode, StaticVerifier};
pub use verifier::{
    EntryPoint, MetaTxCall, MetaTxParamsRequest, Network, NewOperationRequest, PendingTx, TxHash,
    TxReceipt, Verifier, VerifierError,
};
